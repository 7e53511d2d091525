//! End-to-end work-unit creation
//!
//! Stages run strictly in order: resolve the image, size the VM, export the
//! image (or reuse an earlier export), render the descriptor and guest
//! script, package the image files, and hand everything to `create_work`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::boinc::{self, DownloadHierarchy, WorkUnit};
use crate::docker::{self, ImageInfo, ImageManifest};
use crate::job::package::image_tar_name;
use crate::job::{
    memory_check, vbox, Delivery, FileSource, GuestScript, InputFile, JobRequest, Packager,
    VboxOption,
};
use crate::sshgrid;
use crate::storage::{KeyStore, ProjectPaths};

/// What a submission runs against
pub struct Environment<'a> {
    pub paths: &'a ProjectPaths,
    /// Only needed in sshgrid mode
    pub key_store: Option<&'a KeyStore>,
    /// Scratch directory owned by the caller
    pub scratch: &'a Path,
}

/// An image ready to be packaged
#[derive(Debug)]
pub struct ExportedImage {
    pub info: ImageInfo,
    pub manifest: ImageManifest,
    /// Unpacked into the scratch directory during this run
    pub extracted: bool,
}

/// Build and submit a work unit, returning the submission output
pub async fn create_work(request: &JobRequest, env: &Environment<'_>) -> Result<String> {
    let image = docker::normalize_reference(&request.image);
    let docker = docker::connect()?;
    let info = docker::resolve_image(&docker, &image).await?;
    debug!("Resolved {} to {}", image, info.short_id());

    let hierarchy = DownloadHierarchy::new(env.paths);
    let delivery = Delivery::from_native_unzip(request.native_unzip);
    let image_path = hierarchy
        .path(&delivery.filename(&image_tar_name(&info.id)))
        .await?;

    let (manifest, extracted) = if !request.force_reimport && image_path.exists() {
        (docker::read_cached_manifest(&image_path)?, false)
    } else {
        (docker::save_image(&image, env.scratch).await?, true)
    };
    debug!(
        "Manifest lists {} layers, tags {:?}",
        manifest.layers.len(),
        manifest.repo_tags
    );

    let exported = ExportedImage {
        info,
        manifest,
        extracted,
    };
    submit_image(request, env, &hierarchy, &exported).await
}

/// Everything after the image has been exported
pub async fn submit_image(
    request: &JobRequest,
    env: &Environment<'_>,
    hierarchy: &DownloadHierarchy<'_>,
    image: &ExportedImage,
) -> Result<String> {
    let mut options = request.create_work.clone();

    let memory = memory_check(image.info.size_mb(), request.memory);
    options.set("rsc_memory_bound", memory * 1_000_000);

    let mut input_files = request.input_files.clone();

    let mut vbox_options = request.vbox_options.clone();
    if request.disable_automatic_checkpoints {
        vbox_options.push(VboxOption::flag("disable_automatic_checkpoints"));
    }
    vbox_options.push(VboxOption::value("memory_size_mb", memory));
    input_files.push(InputFile::inline("vbox_job.xml", vbox::render(&vbox_options)));

    let sshgrid_script = if request.sshgrid_mode {
        let store = env
            .key_store
            .context("sshgrid mode needs a key store")?;
        let session = sshgrid::configure(env.paths, store, env.scratch).await?;
        input_files.extend(session.input_files);
        sshgrid::force_single_result(&mut options);
        Some(session.script)
    } else {
        None
    };

    let command = request.command.tokens();
    let script = GuestScript {
        image: &image.info.reference,
        entrypoint: request.entrypoint.as_deref(),
        command: &command,
        prerun: &request.prerun,
        postrun: &request.postrun,
        sshgrid: sshgrid_script.as_deref(),
    };
    input_files.push(InputFile::inline("shared/boinc_app", script.render()));

    let packager = Packager {
        hierarchy,
        scratch: env.scratch,
        delivery: Delivery::from_native_unzip(request.native_unzip),
        force_reimport: request.force_reimport,
        extracted: image.extracted,
    };
    for layer in image.manifest.layers() {
        input_files.push(packager.layer(&layer).await?);
    }
    input_files.push(packager.image(&image.info.id, &image.manifest).await?);

    info!("Creating input template for job...");
    let template = boinc::render_input_template(&input_files);
    let template_path = env
        .scratch
        .join(format!("boinc2docker_in_{}", Uuid::new_v4().simple()));
    tokio::fs::write(&template_path, template)
        .await
        .context("Failed to write input template")?;

    let mut files = Vec::with_capacity(input_files.len());
    for file in &input_files {
        files.push(physical_name(hierarchy, file).await?);
    }

    boinc::create_work(
        env.paths,
        &WorkUnit {
            appname: &request.appname,
            template: &template_path,
            options: &options,
            files: &files,
        },
    )
    .await
}

/// Name `create_work` knows the file by, staging it first if needed
async fn physical_name(hierarchy: &DownloadHierarchy<'_>, file: &InputFile) -> Result<String> {
    match &file.source {
        FileSource::Staged(name) => Ok(name.clone()),
        FileSource::Inline(contents) => hierarchy.stage(contents).await,
        FileSource::Local(path) => {
            let contents = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read input file {:?}", path))?;
            hierarchy.stage(&contents).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boinc::hierarchy::staged_name;
    use crate::boinc::hierarchy::tests::{fake_project, write_tool};
    use crate::job::JobCommand;
    use regex::Regex;
    use tempfile::TempDir;

    const LAYERS: [&str; 2] = ["1111aaaa", "2222bbbb"];

    /// Project whose create_work records its arguments and template
    fn project() -> (TempDir, ProjectPaths) {
        let (dir, paths) = fake_project();
        write_tool(
            &dir.path().join("bin/create_work"),
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > args.txt\n\
             while [ $# -gt 0 ]; do if [ \"$1\" = --wu_template ]; then cp \"$2\" template.xml; fi; shift; done\n\
             echo ' wu_boinc2docker_42 '\n",
        );
        (dir, paths)
    }

    fn exported(scratch: &Path) -> ExportedImage {
        for layer in LAYERS {
            std::fs::create_dir_all(scratch.join(layer)).unwrap();
            std::fs::write(scratch.join(layer).join("layer.tar"), layer).unwrap();
        }
        std::fs::write(scratch.join("cfg.json"), b"{}").unwrap();
        let manifest = format!(
            r#"[{{"Config":"cfg.json","RepoTags":["alpine:latest"],"Layers":["{}/layer.tar","{}/layer.tar"]}}]"#,
            LAYERS[0], LAYERS[1]
        );
        std::fs::write(scratch.join("manifest.json"), &manifest).unwrap();
        ExportedImage {
            info: ImageInfo {
                reference: "alpine:latest".into(),
                id: "cafebabe".into(),
                size: 100_000_000,
            },
            manifest: ImageManifest::from_slice(manifest.as_bytes()).unwrap(),
            extracted: true,
        }
    }

    fn open_names(template: &str) -> Vec<(usize, String)> {
        let re = Regex::new(r"<file_number>(\d+)</file_number>\s*<open_name>([^<]*)</open_name>").unwrap();
        re.captures_iter(template)
            .map(|c| (c[1].parse().unwrap(), c[2].to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_submit_image() {
        let (dir, paths) = project();
        let scratch = TempDir::new().unwrap();
        let image = exported(scratch.path());
        let hierarchy = DownloadHierarchy::new(&paths);

        let extra = scratch.path().join("params.json");
        std::fs::write(&extra, b"{\"n\": 3}").unwrap();

        let mut request = JobRequest::new("alpine");
        request.command = JobCommand::Line("echo hello world".into());
        request.input_files.push(InputFile::parse_local(&format!("shared/params.json={}", extra.display())).unwrap());
        request.create_work.set("target_nresults", 2);

        let env = Environment {
            paths: &paths,
            key_store: None,
            scratch: scratch.path(),
        };
        let wu = submit_image(&request, &env, &hierarchy, &image).await.unwrap();
        assert_eq!(wu, "wu_boinc2docker_42");

        let template = std::fs::read_to_string(dir.path().join("template.xml")).unwrap();
        let names = open_names(&template);
        let expected = vec![
            "shared/params.json".to_string(),
            "vbox_job.xml".to_string(),
            "shared/boinc_app".to_string(),
            format!("shared/image/layer_{}.tar.manual.gz", LAYERS[0]),
            format!("shared/image/layer_{}.tar.manual.gz", LAYERS[1]),
            "shared/image/image_cafebabe.tar.manual.gz".to_string(),
        ];
        assert_eq!(names.len(), expected.len());
        for (i, (number, name)) in names.iter().enumerate() {
            assert_eq!(*number, i);
            assert_eq!(name, &expected[i]);
        }

        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(&args[..2], &["--appname", "boinc2docker"]);
        assert_eq!(args[2], "--wu_template");
        assert_eq!(
            &args[4..8],
            &["--target_nresults", "2", "--rsc_memory_bound", "900000000"]
        );

        // Physical files follow the template order
        let files = &args[8..];
        assert_eq!(files.len(), expected.len());
        assert_eq!(files[0], staged_name(b"{\"n\": 3}"));
        assert_eq!(files[3], format!("layer_{}.tar.manual.gz", LAYERS[0]));
        assert_eq!(files[5], "image_cafebabe.tar.manual.gz");

        // Generated files were staged under their content names
        let vbox_path = hierarchy.path(files[1]).await.unwrap();
        let vbox = std::fs::read_to_string(vbox_path).unwrap();
        assert!(vbox.contains("<disable_automatic_checkpoints/>"));
        assert!(vbox.contains("<memory_size_mb>900</memory_size_mb>"));

        let script_path = hierarchy.path(files[2]).await.unwrap();
        let script = std::fs::read_to_string(script_path).unwrap();
        assert!(script.contains("docker run --rm -v /root/shared:/root/shared alpine:latest echo hello world"));
        assert!(!script.contains("Reverse tunneling"));
    }

    #[tokio::test]
    async fn test_native_unzip_and_vbox_options() {
        let (dir, paths) = project();
        let scratch = TempDir::new().unwrap();
        let image = exported(scratch.path());
        let hierarchy = DownloadHierarchy::new(&paths);

        let mut request = JobRequest::new("alpine");
        request.native_unzip = true;
        request.memory = Some(512);
        request.disable_automatic_checkpoints = false;
        request.vbox_options.push(VboxOption::value("fraction_done_filename", "progress"));

        let env = Environment {
            paths: &paths,
            key_store: None,
            scratch: scratch.path(),
        };
        submit_image(&request, &env, &hierarchy, &image).await.unwrap();

        let template = std::fs::read_to_string(dir.path().join("template.xml")).unwrap();
        assert!(template.contains("<open_name>shared/image/image_cafebabe.tar</open_name>"));
        assert_eq!(template.matches("<gzip/>").count(), 3);

        let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert!(args.contains("--rsc_memory_bound\n512000000\n"));
        let vbox_name = args.lines().nth(6).unwrap();
        let vbox = std::fs::read_to_string(hierarchy.path(vbox_name).await.unwrap()).unwrap();
        assert!(!vbox.contains("disable_automatic_checkpoints"));
        let progress = vbox.find("<fraction_done_filename>progress</fraction_done_filename>").unwrap();
        assert!(progress < vbox.find("<memory_size_mb>512</memory_size_mb>").unwrap());
    }

    #[tokio::test]
    async fn test_sshgrid_needs_key_store() {
        let (_dir, paths) = project();
        let scratch = TempDir::new().unwrap();
        let image = exported(scratch.path());
        let hierarchy = DownloadHierarchy::new(&paths);

        let mut request = JobRequest::new("alpine");
        request.sshgrid_mode = true;
        let env = Environment {
            paths: &paths,
            key_store: None,
            scratch: scratch.path(),
        };
        assert!(submit_image(&request, &env, &hierarchy, &image).await.is_err());
    }
}
