//! Image reference normalization
//!
//! Docker treats an untagged reference as `:latest`. We make that explicit up
//! front so every later lookup and the guest `docker run` line agree on the
//! exact reference.

/// Append `:latest` to a reference that carries no tag.
///
/// A colon in the registry part (`registry:5000/image`) is a port, not a tag,
/// and digest references (`image@sha256:...`) are returned unchanged.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_reference("alpine"), "alpine:latest");
/// assert_eq!(normalize_reference("alpine:3.19"), "alpine:3.19");
/// assert_eq!(normalize_reference("localhost:5000/app"), "localhost:5000/app:latest");
/// ```
pub fn normalize_reference(image: &str) -> String {
    if image.contains('@') || split_tag(image).1.is_some() {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Split a reference into repository and optional tag
fn split_tag(image: &str) -> (&str, Option<&str>) {
    match image.rfind(':') {
        // Only a colon after the last slash separates a tag
        Some(pos) if !image[pos + 1..].contains('/') => (&image[..pos], Some(&image[pos + 1..])),
        _ => (image, None),
    }
}

/// Repository and tag (or digest) to ask the registry for.
///
/// `image@sha256:<hex>` pulls `image` at the digest; anything else pulls its
/// tag, defaulting to `latest`.
pub fn pull_target(image: &str) -> (&str, &str) {
    if let Some((repo, digest)) = image.split_once('@') {
        return (repo, digest);
    }
    let (repo, tag) = split_tag(image);
    (repo, tag.unwrap_or("latest"))
}
