use anyhow::Result;
use relay_api::{ActionRecord, ElementRecord, TagNames};
use relay_parser::{ParserCallbacks, ParserOptions, StreamParser};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ParsedElement {
    #[serde(flatten)]
    record: ElementRecord,
    closed: bool,
    actions: Vec<ActionRecord>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ParseReport {
    visible: String,
    elements: Vec<ParsedElement>,
}

/// Collects what the parser saw, grouped by element.
#[derive(Default)]
struct Collector {
    elements: Mutex<Vec<ParsedElement>>,
}

impl Collector {
    fn with_element(&self, element_id: &str, f: impl FnOnce(&mut ParsedElement)) {
        let mut elements = self.elements.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(element) = elements.iter_mut().rev().find(|e| e.record.id == element_id) {
            f(element);
        }
    }
}

impl ParserCallbacks for Collector {
    fn on_element_open(&self, element: &ElementRecord) -> Option<String> {
        self.elements
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(ParsedElement {
                record: element.clone(),
                closed: false,
                actions: Vec::new(),
            });
        None
    }

    fn on_element_close(&self, element: &ElementRecord) {
        self.with_element(&element.id, |e| e.closed = true);
    }

    fn on_action_close(&self, action: ActionRecord) {
        let element_id = action.element_id.clone();
        self.with_element(&element_id, |e| e.actions.push(action));
    }
}

/// Parse `transcript` in one pass and print a JSON report to stdout.
pub fn run(transcript: &str, stream_id: &str, tags: TagNames) -> Result<()> {
    let report = parse_report(transcript, stream_id, tags);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_report(transcript: &str, stream_id: &str, tags: TagNames) -> ParseReport {
    let collector = Arc::new(Collector::default());
    let mut parser = StreamParser::new(
        ParserOptions::default()
            .with_tags(tags)
            .with_callbacks(collector.clone()),
    );

    let visible = parser.parse(stream_id, transcript);
    drop(parser);

    let elements = std::mem::take(&mut *collector.elements.lock().unwrap_or_else(|p| p.into_inner()));
    ParseReport { visible, elements }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_api::Operation;

    const TRANSCRIPT: &str = concat!(
        "Here: <relayArtifact id=\"demo\" title=\"Demo\">",
        "<relayAction type=\"file\" path=\"a.txt\">hi</relayAction>",
        "<relayAction type=\"shell\">cat a.txt</relayAction>",
        "<relayAction type=\"deploy\">prod</relayAction>",
        "</relayArtifact> done",
    );

    #[test]
    fn test_report_covers_every_operation_kind() {
        let report = parse_report(TRANSCRIPT, "msg", TagNames::default());

        assert_eq!(report.visible, "Here:  done");
        assert_eq!(report.elements.len(), 1);
        let element = &report.elements[0];
        assert_eq!(element.record, ElementRecord::new("msg", "demo", "Demo"));
        assert!(element.closed);
        let ops: Vec<_> = element.actions.iter().map(|a| a.operation.clone()).collect();
        assert_eq!(
            ops,
            vec![
                Operation::FileWrite {
                    path: "a.txt".into(),
                    content: "hi\n".into(),
                },
                Operation::Shell {
                    command: "cat a.txt".into(),
                },
                Operation::Unknown {
                    kind: "deploy".into(),
                    content: "prod".into(),
                },
            ]
        );
    }

    #[test]
    fn test_report_json_round_trips() {
        let report = parse_report(TRANSCRIPT, "msg", TagNames::default());

        let json = serde_json::to_string_pretty(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["elements"][0]["id"], "demo");
        assert_eq!(value["elements"][0]["actions"][2]["operation"]["kind"], "unknown");
        assert_eq!(value["elements"][0]["actions"][2]["operation"]["type"], "deploy");

        let back: ParseReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
