//! Substrate content validation rules.

use super::SubstrateFile;

/// Returns the rejection reason, or `Ok` when the content may be written.
/// Every file must be non-empty and open with a `# ` heading; PLAN must
/// additionally carry a `## Tasks` section.
pub fn validate(file: SubstrateFile, content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("content is empty".to_string());
    }
    if !content.starts_with("# ") {
        return Err("content must start with a '# ' heading".to_string());
    }
    if file == SubstrateFile::Plan && !content.contains("\n## Tasks") {
        return Err("PLAN requires a '## Tasks' section".to_string());
    }
    Ok(())
}
