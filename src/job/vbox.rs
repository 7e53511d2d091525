//! The `vbox_job.xml` descriptor read by the VirtualBox wrapper

use crate::boinc::escape_xml;
use crate::errors::SubmitError;

/// An extra option tag in vbox_job.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VboxOption {
    /// `<name/>`
    Flag(String),
    /// `<name>value</name>`
    Value(String, String),
}

impl VboxOption {
    pub fn flag(name: impl Into<String>) -> Self {
        VboxOption::Flag(name.into())
    }

    pub fn value(name: impl Into<String>, value: impl ToString) -> Self {
        VboxOption::Value(name.into(), value.to_string())
    }

    /// Parse `name` or `name=value`
    pub fn parse(arg: &str) -> Result<Self, SubmitError> {
        let (name, value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (arg, None),
        };
        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(SubmitError::InvalidVboxOption(arg.to_string()));
        }
        Ok(match value {
            Some(value) => VboxOption::value(name, value),
            None => VboxOption::flag(name),
        })
    }
}

/// Render the descriptor. The fixed skeleton always comes first.
pub fn render(options: &[VboxOption]) -> String {
    let extra: String = options
        .iter()
        .map(|option| match option {
            VboxOption::Flag(name) => format!("    <{}/>\n", name),
            VboxOption::Value(name, value) => {
                format!("    <{0}>{1}</{0}>\n", name, escape_xml(value))
            }
        })
        .collect();

    format!(
        r#"<vbox_job>

    <os_name>Linux26_64</os_name>
    <enable_isocontextualization>1</enable_isocontextualization>
    <enable_shared_directory/>
    <enable_network/>
    <completion_trigger_file>completion_trigger_file</completion_trigger_file>

{extra}
</vbox_job>
"#
    )
}
