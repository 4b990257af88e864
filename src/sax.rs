//! Interface-only surface for the SAX XML reader and its encoding sniffer.
//!
//! Per this crate's scope, the reader itself — a single-pass state machine
//! that walks a caller-owned, mutable byte buffer, overwriting element and
//! attribute terminators with `\0` to carve zero-terminated substrings in
//! place — is an external collaborator: no parsing loop lives in this crate.
//! What *is* specified here is the boundary a driver plugs into: the closed
//! set of encodings the sniffer can report, and the callback surface the
//! reader invokes as it walks the buffer. This mirrors how this corpus keeps
//! a device boundary (e.g. a keyboard driver) as a thin trait/struct surface
//! when the true driver detail lives outside the audited core.

/// The encodings the sniffer can distinguish, in the order it checks for
/// them: byte-order mark, then a heuristic zero-byte pattern, then the
/// declared `encoding=` attribute of the XML prolog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// The sniffer could not determine, or does not support, the buffer's
    /// encoding.
    Unsupported,
    /// UTF-8, with or without a byte-order mark.
    Utf8,
    /// Single-byte ANSI / Latin-1.
    Ansi,
    /// UCS-2, big-endian.
    Ucs2BigEndian,
    /// UCS-2, little-endian.
    Ucs2LittleEndian,
}

/// The callback surface a single-pass SAX-style XML reader invokes as it
/// walks a caller-owned byte buffer in place. `tag`, `text`, attribute
/// `name`/`value` are borrows into that same buffer: the reader has
/// overwritten their trailing terminator with `\0` (or the slice's end
/// already serves as the terminator) to carve them out without a separate
/// copy.
///
/// No implementation of a driving reader loop lives in this crate; this
/// trait exists so one can be written against a stable, specified callback
/// contract without depending on this crate's internals.
pub trait SaxHandler {
    /// Called once, after the encoding sniff, before any element callback.
    fn start_document(&mut self, encoding: Encoding);

    /// Called once, after the last element has closed.
    fn end_document(&mut self);

    /// Called when an opening tag is recognized.
    fn start_element(&mut self, tag: &str);

    /// Called when a closing tag is recognized. `text` is the element's
    /// text content if it had any, `None` for an empty or self-closing
    /// element.
    fn end_element(&mut self, tag: &str, text: Option<&str>);

    /// Called once per attribute on a start tag, in document order.
    /// `value` is `None` for a valueless attribute. `is_last` is `true` on
    /// the tag's final attribute, letting a handler flush per-tag state
    /// without buffering the attribute list itself.
    fn attribute(&mut self, name: &str, value: Option<&str>, is_last: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: alloc::vec::Vec<alloc::string::String>,
    }

    impl SaxHandler for Recorder {
        fn start_document(&mut self, encoding: Encoding) {
            self.events
                .push(alloc::format!("start_document({encoding:?})"));
        }

        fn end_document(&mut self) {
            self.events.push(alloc::string::String::from("end_document"));
        }

        fn start_element(&mut self, tag: &str) {
            self.events.push(alloc::format!("start_element({tag})"));
        }

        fn end_element(&mut self, tag: &str, text: Option<&str>) {
            self.events.push(alloc::format!("end_element({tag}, {text:?})"));
        }

        fn attribute(&mut self, name: &str, value: Option<&str>, is_last: bool) {
            self.events
                .push(alloc::format!("attribute({name}, {value:?}, {is_last})"));
        }
    }

    #[test]
    fn handler_records_a_driven_sequence() {
        let mut handler = Recorder::default();
        handler.start_document(Encoding::Utf8);
        handler.start_element("root");
        handler.attribute("id", Some("1"), true);
        handler.end_element("root", Some("hi"));
        handler.end_document();

        assert_eq!(handler.events.len(), 5);
        assert_eq!(handler.events[0], "start_document(Utf8)");
        assert_eq!(handler.events[4], "end_document");
    }
}
