//! Control-file publishing
//!
//! Patterns and pre-authored scripts are uploaded to the hosting service,
//! which answers with a durable URL that [`HandyClient::sync_prepare`] hands
//! to the device.

use tracing::{instrument, warn};

use crate::client::HandyClient;
use crate::error::{HandyError, Result};
use crate::sync::now_ms;
use crate::types::{ControlFileKind, PatternPoint, PublishedFile};

/// First line of a generated pattern file
pub const PATTERN_HEADER: &str = r#"#{"type":"handy"}"#;

const GENERATED_NAME_PREFIX: &str = "HandyGenerated";

/// Serialize a pattern as the device CSV format.
///
/// Points are written in the order given; the caller is responsible for
/// time ordering.
pub fn serialize_pattern(points: &[PatternPoint]) -> Result<String> {
    if points.is_empty() {
        return Err(HandyError::InvalidInput(
            "No pattern data provided".to_string(),
        ));
    }
    if let Some(point) = points.iter().find(|p| p.position > 100) {
        return Err(HandyError::InvalidInput(format!(
            "position {} at {}ms is outside 0-100",
            point.position, point.time_ms
        )));
    }

    let mut csv = String::from(PATTERN_HEADER);
    for point in points {
        csv.push_str(&format!("\n{},{}", point.time_ms, point.position));
    }
    Ok(csv)
}

/// Parse `time,position` lines into a pattern.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_pattern(text: &str) -> Result<Vec<PatternPoint>> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            let invalid = || {
                HandyError::InvalidInput(format!(
                    "line {}: expected 'time,position', got '{}'",
                    line_no, line
                ))
            };
            let (time, position) = line.split_once(',').ok_or_else(invalid)?;
            Ok(PatternPoint {
                time_ms: time.trim().parse().map_err(|_| invalid())?,
                position: position.trim().parse().map_err(|_| invalid())?,
            })
        })
        .collect()
}

fn generated_name(kind: ControlFileKind) -> String {
    format!("{}_{}.{}", GENERATED_NAME_PREFIX, now_ms(), kind.extension())
}

impl HandyClient {
    // =========================================================================
    // Publishing
    // =========================================================================

    /// Upload a pattern and return its hosted location.
    ///
    /// A file name is generated when `name` is `None` or empty.
    #[instrument(skip(self, points), fields(points = points.len()))]
    pub async fn publish_pattern(
        &self,
        points: &[PatternPoint],
        name: Option<&str>,
    ) -> Result<PublishedFile> {
        const COMMAND: &str = "Pattern to URL";
        self.begin(COMMAND);
        let result = match serialize_pattern(points) {
            Ok(csv) => {
                self.upload(COMMAND, csv.into_bytes(), name, ControlFileKind::Csv)
                    .await
            }
            Err(e) => Err(e),
        };
        self.finish(COMMAND, result)
    }

    /// Upload a pre-authored control file as-is
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn publish_file(
        &self,
        content: &str,
        kind: ControlFileKind,
        name: Option<&str>,
    ) -> Result<PublishedFile> {
        let command = match kind {
            ControlFileKind::Csv => "CSV to URL",
            ControlFileKind::Funscript => "Funscript to URL",
        };
        self.begin(command);
        let result = if content.is_empty() {
            Err(HandyError::InvalidInput(format!(
                "No {} content provided",
                kind.extension()
            )))
        } else {
            self.upload(command, content.as_bytes().to_vec(), name, kind)
                .await
        };
        self.finish(command, result)
    }

    async fn upload(
        &self,
        command: &'static str,
        bytes: Vec<u8>,
        name: Option<&str>,
        kind: ControlFileKind,
    ) -> Result<PublishedFile> {
        let name = name
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| generated_name(kind));
        let size_bytes = bytes.len() as u64;

        let body = self
            .transport()
            .post_file(self.upload_url(), &name, bytes)
            .await;
        let response = self.parse_response(command, &body);

        if response.is_malformed() {
            return Err(HandyError::Device("Invalid response".to_string()));
        }
        if response.success() == Some(false) {
            return Err(HandyError::Device(
                response.error_message().unwrap_or("Unknown error").to_string(),
            ));
        }

        // A missing URL is reported to the caller as an empty one
        let url = response.get_str("url").unwrap_or_default().to_string();
        if url.is_empty() {
            warn!("{} returned no URL for {}", command, name);
        }

        Ok(PublishedFile {
            url,
            name,
            size_bytes: Some(size_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_pattern() {
        let points = [PatternPoint::new(0, 0), PatternPoint::new(500, 100)];
        assert_eq!(
            serialize_pattern(&points).unwrap(),
            "#{\"type\":\"handy\"}\n0,0\n500,100"
        );
    }

    #[test]
    fn test_serialize_keeps_caller_order() {
        let points = [PatternPoint::new(900, 10), PatternPoint::new(100, 90)];
        assert_eq!(
            serialize_pattern(&points).unwrap(),
            "#{\"type\":\"handy\"}\n900,10\n100,90"
        );
    }

    #[test]
    fn test_serialize_rejects_bad_input() {
        assert!(matches!(
            serialize_pattern(&[]),
            Err(HandyError::InvalidInput(_))
        ));
        assert!(matches!(
            serialize_pattern(&[PatternPoint::new(0, 101)]),
            Err(HandyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_parse_pattern() {
        let text = "#{\"type\":\"handy\"}\n0,0\n\n 250 , 50 \n500,100\n";
        let points = parse_pattern(text).unwrap();
        assert_eq!(
            points,
            vec![
                PatternPoint::new(0, 0),
                PatternPoint::new(250, 50),
                PatternPoint::new(500, 100)
            ]
        );
    }

    #[test]
    fn test_parse_pattern_reports_line() {
        match parse_pattern("0,0\n100;50\n") {
            Err(HandyError::InvalidInput(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_pattern("0,300").is_err());
    }

    #[test]
    fn test_generated_name() {
        let name = generated_name(ControlFileKind::Funscript);
        assert!(name.starts_with("HandyGenerated_"));
        assert!(name.ends_with(".funscript"));
    }
}
