use crate::core::error::AndroshError;
use crate::distro::bridge;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Launch-script template compiled into the binary; used when no override
/// exists in the assets directory.
pub const LAUNCH_TEMPLATE: &str = include_str!("../../assets/proot.sh");

/// Replace every `{{ key }}` (inner whitespace optional) in `content`.
/// Placeholders without a matching variable are left as written.
pub fn render_str(content: &str, variables: &[(&str, &str)]) -> Result<String, AndroshError> {
    let mut out = content.to_string();
    for &(key, value) in variables {
        let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key));
        let re = Regex::new(&pattern).map_err(|e| AndroshError::Template(e.to_string()))?;
        out = re.replace_all(&out, regex::NoExpand(value)).into_owned();
    }
    Ok(out)
}

/// Like [`render_str`], but every value is inserted as a single shell word.
pub fn render_shell_str(content: &str, variables: &[(&str, &str)]) -> Result<String, AndroshError> {
    let quoted = variables
        .iter()
        .map(|&(key, value)| Ok((key, bridge::quote(value)?)))
        .collect::<Result<Vec<_>, AndroshError>>()?;
    let pairs: Vec<(&str, &str)> = quoted.iter().map(|(k, v)| (*k, v.as_str())).collect();
    render_str(content, &pairs)
}

/// Template text at `template` when that file exists, else the built-in one.
pub fn load(template: &Path) -> Result<String, AndroshError> {
    if !template.exists() {
        tracing::debug!(path = %template.display(), "no template override, using built-in");
        return Ok(LAUNCH_TEMPLATE.to_string());
    }
    fs::read_to_string(template).map_err(|e| {
        AndroshError::Template(format!("cannot read {}: {}", template.display(), e))
    })
}

/// Render `content` as a shell script into `dest`, creating the destination
/// directory.
pub fn render_script(content: &str, dest: &Path, variables: &[(&str, &str)]) -> Result<(), AndroshError> {
    let rendered = render_shell_str(content, variables)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, rendered)?;
    tracing::debug!(dest = %dest.display(), "rendered launch script");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_with_and_without_spaces() {
        let out = render_str("cd {{root}} && ls {{ distro }}", &[("root", "/r"), ("distro", "Alpine")])
            .unwrap();
        assert_eq!(out, "cd /r && ls Alpine");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let out = render_str("{{ name }} {{ other }}", &[("name", "alpha")]).unwrap();
        assert_eq!(out, "alpha {{ other }}");
    }

    #[test]
    fn values_are_inserted_literally() {
        let out = render_str("{{ root }}", &[("root", "/a/$1/b")]).unwrap();
        assert_eq!(out, "/a/$1/b");
    }

    #[test]
    fn shell_values_stay_one_word() {
        let hostile = "/data/local/tmp/AndroSH/x\";id;\"";
        let out = render_shell_str("ROOT={{ root }}", &[("root", hostile)]).unwrap();
        let assignment = out.strip_prefix("ROOT=").unwrap();
        assert_eq!(bridge::tokenize(assignment).unwrap(), vec![hostile]);
    }

    #[test]
    fn built_in_template_quotes_every_placeholder() {
        let out = render_shell_str(
            LAUNCH_TEMPLATE,
            &[("root", "/base/my box"), ("distro", "Alpine"), ("name", "my box")],
        )
        .unwrap();
        assert!(!out.contains("{{"));
        let root = out
            .lines()
            .find_map(|l| l.strip_prefix("ROOT="))
            .expect("ROOT assignment");
        assert_eq!(bridge::tokenize(root).unwrap(), vec!["/base/my box"]);
    }

    #[test]
    fn missing_override_falls_back_to_built_in() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(load(&tmp.path().join("proot.sh")).unwrap(), LAUNCH_TEMPLATE);
    }

    #[test]
    fn override_file_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("t.sh");
        fs::write(&template, "echo {{ name }}\n").unwrap();
        assert_eq!(load(&template).unwrap(), "echo {{ name }}\n");
    }

    #[test]
    fn unreadable_override_is_template_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load(tmp.path()).unwrap_err();
        assert!(matches!(err, AndroshError::Template(_)));
    }

    #[test]
    fn render_script_writes_nested_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("out").join("alpha").join("t.sh");
        render_script("echo {{ name }}\n", &dest, &[("name", "alpha")]).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "echo alpha\n");
    }
}
