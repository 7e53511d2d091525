//! Work-unit input templates
//!
//! `create_work` matches the `n`-th physical file on its command line with
//! `<file_info><number>n</number>` and the `file_ref` carrying
//! `<file_number>n</file_number>`, so the template is generated straight from
//! the ordered input list.

use crate::job::InputFile;

/// Escape text for use in XML character data
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the input template for `files`, in order
pub fn render_input_template(files: &[InputFile]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" ?>\n<input_template>\n    <workunit>\n");

    for (i, file) in files.iter().enumerate() {
        xml.push_str(&format!(
            r#"        <file_ref>
            <file_number>{}</file_number>
            <open_name>{}</open_name>
            <copy_file/>
        </file_ref>
"#,
            i,
            escape_xml(&file.open_name)
        ));
    }
    xml.push_str("    </workunit>\n");

    for (i, file) in files.iter().enumerate() {
        let flags: String = file
            .flags
            .iter()
            .map(|flag| format!("        <{}/>\n", flag.tag()))
            .collect();
        xml.push_str(&format!(
            "    <file_info>\n        <number>{}</number>\n{}    </file_info>\n",
            i, flags
        ));
    }

    xml.push_str("</input_template>\n");
    xml
}
