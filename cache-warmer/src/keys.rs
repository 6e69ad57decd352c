use std::path::Path;

/// One key per line. Surrounding whitespace is trimmed; blank lines and lines
/// starting with `#` are skipped.
pub fn parse_keys(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub async fn load_keys(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(parse_keys(&contents))
}
