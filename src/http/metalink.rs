//! IETF metalink v4 (`urn:ietf:params:xml:ns:metalink`) parsing, used to pick
//! an alternate download mirror for an archive.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum MetalinkError {
    #[error("failed to parse metalink document: {0}")]
    Xml(#[from] quick_xml::de::DeError),
}

#[derive(Debug, Deserialize)]
struct Metalink4 {
    #[serde(rename = "file", default)]
    files: Vec<File>,
}

#[derive(Debug, Deserialize)]
struct File {
    #[serde(rename = "url", default)]
    urls: Vec<MirrorUrl>,
}

#[derive(Debug, Deserialize)]
struct MirrorUrl {
    #[serde(rename = "@priority", default)]
    priority: u32,
    #[serde(rename = "$text")]
    text: String,
}

/// Returns the mirror URLs listed in a metalink document, ordered from
/// highest priority (lowest `priority` number) to lowest.
pub fn parse_metalink(body: &str) -> Result<Vec<Url>, MetalinkError> {
    let doc: Metalink4 = quick_xml::de::from_str(body)?;

    let mut urls: Vec<(u32, Url)> = doc
        .files
        .into_iter()
        .flat_map(|file| file.urls.into_iter())
        .filter_map(|mirror| Url::parse(mirror.text.trim()).ok().map(|u| (mirror.priority, u)))
        .collect();

    urls.sort_by_key(|(priority, _)| *priority);
    Ok(urls.into_iter().map(|(_, url)| url).collect())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn parses_prioritized_mirrors() {
        let body = indoc! {r#"
            <?xml version="1.0" encoding="UTF-8"?>
            <metalink xmlns="urn:ietf:params:xml:ns:metalink">
              <file name="qtbase.7z">
                <url priority="2">https://mirror-b.example/qtbase.7z</url>
                <url priority="1">https://mirror-a.example/qtbase.7z</url>
              </file>
            </metalink>
        "#};
        let urls = parse_metalink(body).unwrap();
        assert_eq!(urls[0].as_str(), "https://mirror-a.example/qtbase.7z");
        assert_eq!(urls[1].as_str(), "https://mirror-b.example/qtbase.7z");
    }
}
