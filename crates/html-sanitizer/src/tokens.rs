//! The event-stream model shared by every stage of the pipeline.
//!
//! A sanitization run is a strictly forward flow of events: the tokenizer
//! produces them, the balancer re-nests them, the policy stage filters
//! them, and the renderer serializes them. Stages communicate through the
//! [`HtmlStreamEventReceiver`] trait; the [`HtmlEvent`] enum is the same
//! information as a value, used where events must be stored or mapped
//! (pre- and postprocessors).

/// A single attribute on a start tag.
///
/// Names are canonical lowercase ASCII; values are fully entity-decoded.
/// A boolean attribute carries an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One event in the sanitization stream.
#[derive(Debug, Clone, PartialEq)]
pub enum HtmlEvent {
    OpenDocument,
    CloseDocument,
    OpenTag {
        name: String,
        attributes: Vec<Attribute>,
    },
    CloseTag {
        name: String,
    },
    Text {
        text: String,
    },
}

/// A sink for the HTML event stream.
///
/// Policies, the balancer, and the renderer all implement this; a custom
/// implementation can be handed to
/// [`PolicyFactory::apply`](crate::PolicyFactory::apply) to consume the
/// sanitized stream directly instead of rendering it.
pub trait HtmlStreamEventReceiver {
    fn open_document(&mut self) {}
    fn close_document(&mut self) {}
    fn open_tag(&mut self, name: &str, attributes: Vec<Attribute>);
    fn close_tag(&mut self, name: &str);
    fn text(&mut self, text: &str);

    /// Dispatches an event value to the matching method.
    fn receive(&mut self, event: HtmlEvent) {
        match event {
            HtmlEvent::OpenDocument => self.open_document(),
            HtmlEvent::CloseDocument => self.close_document(),
            HtmlEvent::OpenTag { name, attributes } => self.open_tag(&name, attributes),
            HtmlEvent::CloseTag { name } => self.close_tag(&name),
            HtmlEvent::Text { text } => self.text(&text),
        }
    }
}

/// A receiver that remembers every event it sees. Test helper.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct EventLog {
    pub events: Vec<HtmlEvent>,
}

#[cfg(test)]
impl HtmlStreamEventReceiver for EventLog {
    fn open_document(&mut self) {
        self.events.push(HtmlEvent::OpenDocument);
    }

    fn close_document(&mut self) {
        self.events.push(HtmlEvent::CloseDocument);
    }

    fn open_tag(&mut self, name: &str, attributes: Vec<Attribute>) {
        self.events.push(HtmlEvent::OpenTag {
            name: name.to_string(),
            attributes,
        });
    }

    fn close_tag(&mut self, name: &str) {
        self.events.push(HtmlEvent::CloseTag {
            name: name.to_string(),
        });
    }

    fn text(&mut self, text: &str) {
        self.events.push(HtmlEvent::Text {
            text: text.to_string(),
        });
    }
}
