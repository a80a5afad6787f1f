//! Embedded XMP packet scanning.
//!
//! Two stages with no shared state: [`find_packet`] slices the raw
//! `<x:xmpmeta>...</x:xmpmeta>` span out of the file bytes, and [`parse`]
//! reads keywords, location and rating out of that packet. Malformed XML
//! never surfaces as an error; the fields are simply left empty.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

const OPEN_TAG: &[u8] = b"<x:xmpmeta";
const CLOSE_TAG: &[u8] = b"</x:xmpmeta>";

const NS_RDF: &[u8] = b"http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const NS_DC: &[u8] = b"http://purl.org/dc/elements/1.1/";
const NS_XMP: &[u8] = b"http://ns.adobe.com/xap/1.0/";
const NS_PHOTOSHOP: &[u8] = b"http://ns.adobe.com/photoshop/1.0/";
const NS_IPTC_CORE: &[u8] = b"http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/";

/// Location fields exactly as they appear in the packet (original case).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpLocation {
    pub sublocation: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl XmpLocation {
    fn or(self, fallback: XmpLocation) -> XmpLocation {
        XmpLocation {
            sublocation: self.sublocation.or(fallback.sublocation),
            city: self.city.or(fallback.city),
            state: self.state.or(fallback.state),
            country: self.country.or(fallback.country),
        }
    }

    fn slot(&mut self, field: LocationField) -> &mut Option<String> {
        match field {
            LocationField::Sublocation => &mut self.sublocation,
            LocationField::City => &mut self.city,
            LocationField::State => &mut self.state,
            LocationField::Country => &mut self.country,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpFields {
    /// Trimmed, original case, document order.
    pub keywords: Vec<String>,
    pub location: XmpLocation,
    pub rating: Option<i32>,
}

/// Returns the byte span from the first `<x:xmpmeta` through the first
/// `</x:xmpmeta>` that follows it.
pub fn find_packet(bytes: &[u8]) -> Option<&[u8]> {
    let start = find(bytes, OPEN_TAG)?;
    let end = start + find(&bytes[start..], CLOSE_TAG)? + CLOSE_TAG.len();
    Some(&bytes[start..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Finds and parses the packet embedded in `bytes`. Undecodable bytes are
/// replaced before parsing.
pub fn read(bytes: &[u8]) -> XmpFields {
    match find_packet(bytes) {
        Some(packet) => parse(&String::from_utf8_lossy(packet)),
        None => {
            log::trace!("No XMP packet present");
            XmpFields::default()
        }
    }
}

pub fn parse(packet: &str) -> XmpFields {
    match Scanner::default().run(packet) {
        Ok(fields) => fields,
        Err(e) => {
            log::debug!("Ignoring malformed XMP packet: {}", e);
            XmpFields::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Rdf,
    Dc,
    Xmp,
    Photoshop,
    IptcCore,
    Other,
}

impl Ns {
    fn of(resolved: &ResolveResult) -> Ns {
        match resolved {
            ResolveResult::Bound(Namespace(ns)) => match *ns {
                NS_RDF => Ns::Rdf,
                NS_DC => Ns::Dc,
                NS_XMP => Ns::Xmp,
                NS_PHOTOSHOP => Ns::Photoshop,
                NS_IPTC_CORE => Ns::IptcCore,
                _ => Ns::Other,
            },
            _ => Ns::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationField {
    Sublocation,
    City,
    State,
    Country,
}

fn location_field(ns: Ns, local: &[u8]) -> Option<LocationField> {
    match (ns, local) {
        (Ns::IptcCore, b"Location") => Some(LocationField::Sublocation),
        (Ns::Photoshop, b"City") => Some(LocationField::City),
        (Ns::Photoshop, b"State") => Some(LocationField::State),
        (Ns::Photoshop, b"Country") => Some(LocationField::Country),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Keyword,
    Location(LocationField),
    Rating,
}

/// Text being gathered for the element that sits at `depth` on the stack.
struct Capture {
    target: Target,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct Scanner {
    stack: Vec<(Ns, Vec<u8>)>,
    capture: Option<Capture>,
    subject_bag_done: bool,
    keywords: Vec<String>,
    attr_location: XmpLocation,
    elem_location: XmpLocation,
    attr_rating: Option<i32>,
    elem_rating: Option<i32>,
    rating_element_seen: bool,
}

impl Scanner {
    fn run(mut self, packet: &str) -> Result<XmpFields, quick_xml::Error> {
        let mut reader = NsReader::from_str(packet);

        loop {
            let (resolved, event) = reader.read_resolved_event()?;
            let ns = Ns::of(&resolved);
            match event {
                Event::Start(ref e) => {
                    self.on_description(&reader, ns, e)?;
                    let local = e.local_name().as_ref().to_vec();
                    self.open(ns, local);
                }
                Event::Empty(ref e) => {
                    self.on_description(&reader, ns, e)?;
                }
                Event::Text(ref e) => {
                    if let Some(capture) = self.capture_at_top() {
                        capture.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(ref e) => {
                    if let Some(capture) = self.capture_at_top() {
                        capture.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::End(_) => self.close(),
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(XmpFields {
            keywords: self.keywords,
            location: self.attr_location.or(self.elem_location),
            rating: self.attr_rating.or(self.elem_rating),
        })
    }

    fn capture_at_top(&mut self) -> Option<&mut Capture> {
        let depth = self.stack.len();
        self.capture.as_mut().filter(|c| c.depth == depth)
    }

    /// Attribute form on `rdf:Description`; first non-empty value per field wins.
    fn on_description<R>(
        &mut self,
        reader: &NsReader<R>,
        ns: Ns,
        e: &BytesStart,
    ) -> Result<(), quick_xml::Error> {
        if ns != Ns::Rdf || e.local_name().as_ref() != b"Description" {
            return Ok(());
        }
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let (resolved, local) = reader.resolve_attribute(attr.key);
            let attr_ns = Ns::of(&resolved);
            let value = attr.unescape_value()?;
            if value.is_empty() {
                continue;
            }
            if let Some(field) = location_field(attr_ns, local.as_ref()) {
                let slot = self.attr_location.slot(field);
                if slot.is_none() {
                    *slot = Some(value.into_owned());
                }
            } else if attr_ns == Ns::Xmp && local.as_ref() == b"Rating" && self.attr_rating.is_none() {
                self.attr_rating = value.trim().parse().ok();
            }
        }
        Ok(())
    }

    fn open(&mut self, ns: Ns, local: Vec<u8>) {
        let target = if ns == Ns::Rdf && local == b"li" && self.in_subject_bag() {
            Some(Target::Keyword)
        } else if let Some(field) = location_field(ns, &local) {
            Some(Target::Location(field))
        } else if ns == Ns::Xmp && local == b"Rating" && !self.rating_element_seen {
            self.rating_element_seen = true;
            Some(Target::Rating)
        } else {
            None
        };

        self.stack.push((ns, local));
        if let Some(target) = target {
            if self.capture.is_none() {
                self.capture = Some(Capture {
                    target,
                    depth: self.stack.len(),
                    text: String::new(),
                });
            }
        }
    }

    fn in_subject_bag(&self) -> bool {
        if self.subject_bag_done {
            return false;
        }
        match self.stack.as_slice() {
            [.., (Ns::Dc, parent), (Ns::Rdf, bag)] => parent == b"subject" && bag == b"Bag",
            _ => false,
        }
    }

    fn close(&mut self) {
        let depth = self.stack.len();
        if self.capture.as_ref().map(|c| c.depth) == Some(depth) {
            if let Some(capture) = self.capture.take() {
                self.finish(capture);
            }
        }

        if let Some((ns, local)) = self.stack.pop() {
            let closes_subject_bag = ns == Ns::Rdf
                && local == b"Bag"
                && matches!(self.stack.last(), Some((Ns::Dc, parent)) if parent == b"subject");
            if closes_subject_bag {
                self.subject_bag_done = true;
            }
        }
    }

    fn finish(&mut self, capture: Capture) {
        match capture.target {
            Target::Keyword => {
                let text = capture.text;
                // Entries with ASCII digits or commas (e.g. colour labels) are not keywords.
                if text.chars().any(|c| c.is_ascii_digit() || c == ',') {
                    return;
                }
                let keyword = text.trim();
                if !keyword.is_empty() {
                    self.keywords.push(keyword.to_string());
                }
            }
            Target::Location(field) => {
                let slot = self.elem_location.slot(field);
                if slot.is_none() && !capture.text.is_empty() {
                    *slot = Some(capture.text);
                }
            }
            Target::Rating => {
                self.elem_rating = capture.text.trim().parse().ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTE_FORM: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/"
    xmlns:Iptc4xmpCore="http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmp:Rating="4"
    photoshop:City="Seattle"
    photoshop:State="Washington"
    photoshop:Country="United States"
    Iptc4xmpCore:Location="Pike Place Market">
   <dc:subject>
    <rdf:Bag>
     <rdf:li>Street</rdf:li>
     <rdf:li> Dusk </rdf:li>
     <rdf:li>255,128,0</rdf:li>
     <rdf:li>2025</rdf:li>
    </rdf:Bag>
   </dc:subject>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

    const ELEMENT_FORM: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description xmlns:ps="http://ns.adobe.com/photoshop/1.0/"
                   xmlns:xap="http://ns.adobe.com/xap/1.0/">
   <ps:City>Portland</ps:City>
   <ps:State>Oregon</ps:State>
   <xap:Rating>5</xap:Rating>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

    #[test]
    fn find_packet_spans_open_to_close_tag() {
        let bytes = b"\xff\xd8junk<x:xmpmeta a='1'>inner</x:xmpmeta>trailer</x:xmpmeta>";
        assert_eq!(find_packet(bytes).unwrap(), b"<x:xmpmeta a='1'>inner</x:xmpmeta>");
    }

    #[test]
    fn find_packet_requires_close_after_open() {
        assert!(find_packet(b"</x:xmpmeta> then <x:xmpmeta>").is_none());
        assert!(find_packet(b"no packet here").is_none());
    }

    #[test]
    fn attribute_form_is_read() {
        let fields = parse(ATTRIBUTE_FORM);
        assert_eq!(fields.keywords, vec!["Street", "Dusk"]);
        assert_eq!(fields.rating, Some(4));
        assert_eq!(fields.location.city.as_deref(), Some("Seattle"));
        assert_eq!(fields.location.state.as_deref(), Some("Washington"));
        assert_eq!(fields.location.country.as_deref(), Some("United States"));
        assert_eq!(fields.location.sublocation.as_deref(), Some("Pike Place Market"));
    }

    #[test]
    fn element_form_is_the_fallback() {
        let fields = parse(ELEMENT_FORM);
        assert!(fields.keywords.is_empty());
        assert_eq!(fields.rating, Some(5));
        assert_eq!(fields.location.city.as_deref(), Some("Portland"));
        assert_eq!(fields.location.state.as_deref(), Some("Oregon"));
        assert_eq!(fields.location.country, None);
    }

    #[test]
    fn attribute_wins_over_element() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/">
  <rdf:Description><photoshop:City>Tacoma</photoshop:City></rdf:Description>
  <rdf:Description photoshop:City="Seattle"/>
</rdf:RDF></x:xmpmeta>"#;
        assert_eq!(parse(packet).location.city.as_deref(), Some("Seattle"));
    }

    #[test]
    fn only_ascii_digits_mark_a_non_keyword() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <rdf:Description><dc:subject><rdf:Bag>
   <rdf:li>½ moon</rdf:li><rdf:li>Ⅻ</rdf:li><rdf:li>٣ cats</rdf:li><rdf:li>2025</rdf:li><rdf:li>a,b</rdf:li>
  </rdf:Bag></dc:subject></rdf:Description>
</rdf:RDF></x:xmpmeta>"#;
        assert_eq!(parse(packet).keywords, vec!["½ moon", "Ⅻ", "٣ cats"]);
    }

    #[test]
    fn non_integer_rating_is_ignored() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:xmp="http://ns.adobe.com/xap/1.0/">
  <rdf:Description xmp:Rating="high"/>
  <rdf:Description><xmp:Rating>lots</xmp:Rating></rdf:Description>
</rdf:RDF></x:xmpmeta>"#;
        assert_eq!(parse(packet).rating, None);
    }

    #[test]
    fn unbound_prefixes_do_not_match() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns:photoshop="urn:something-else">
  <rdf:Description photoshop:City="Nowhere"/>
</rdf:RDF></x:xmpmeta>"#;
        assert_eq!(parse(packet).location, XmpLocation::default());
    }

    #[test]
    fn malformed_packet_yields_empty_fields() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description></rdf:RDF></x:xmpmeta>"#;
        assert_eq!(parse(packet), XmpFields::default());
    }

    #[test]
    fn read_decodes_lossily() {
        let mut bytes = b"\xff\xd8\xff\xe1".to_vec();
        bytes.extend_from_slice(ATTRIBUTE_FORM.as_bytes());
        bytes.extend_from_slice(b"\xff\xd9");
        assert_eq!(read(&bytes).rating, Some(4));
    }
}
