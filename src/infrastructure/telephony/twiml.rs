//! TwiML that connects an answered call to the media stream

use crate::domain::shared::AgentId;
use std::fmt::Write;

/// `<Connect><Stream>` response pointing the carrier at `stream_url`
pub fn connect_stream(stream_url: &str, agent_id: Option<&AgentId>) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect>"#);
    let _ = write!(xml, r#"<Stream url="{}">"#, xml_escape(stream_url));
    if let Some(agent_id) = agent_id {
        let _ = write!(
            xml,
            r#"<Parameter name="agentId" value="{}"/>"#,
            xml_escape(agent_id.as_str())
        );
    }
    xml.push_str("</Stream></Connect></Response>");
    xml
}

/// Reject with a spoken explanation and hang up
pub fn say_and_hangup(message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say>{}</Say><Hangup/></Response>"#,
        xml_escape(message)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_stream() {
        let xml = connect_stream(
            "wss://calls.example.com/media-stream",
            Some(&AgentId::new("agent-1")),
        );
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Connect>\
             <Stream url=\"wss://calls.example.com/media-stream\">\
             <Parameter name=\"agentId\" value=\"agent-1\"/>\
             </Stream></Connect></Response>"
        );
    }

    #[test]
    fn test_escaping() {
        let xml = say_and_hangup("Sorry <b> & \"bye\"");
        assert!(xml.contains("Sorry &lt;b&gt; &amp; &quot;bye&quot;"));
        assert!(xml.ends_with("<Hangup/></Response>"));
    }
}
