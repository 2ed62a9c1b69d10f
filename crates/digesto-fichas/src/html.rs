//! A small, forgiving HTML document model.
//!
//! Good enough for the fiche pages: it builds an element tree from tags,
//! decodes the common entities, skips comments, doctype, `<script>` and
//! `<style>`, treats void elements as leaves, and closes an open `<p>` when a
//! block element starts (as browsers do). Tag and attribute names are
//! matched case-insensitively. It is not a conforming HTML5 parser.

use std::borrow::Cow;

/// Index of a node in its [`Document`]. Indices follow document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lower-cased tag name.
    pub name: String,
    /// Attributes with lower-cased names and entity-decoded values.
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c.eq_ignore_ascii_case(class)))
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Root,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    children: Vec<NodeId>,
    data: NodeData,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Starting one of these closes an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "div", "dl", "fieldset", "footer",
    "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

/// An open `<p>` is not closed across these.
const SCOPE_BOUNDARIES: &[&str] = &["div", "td", "th", "li", "table", "blockquote", "body", "html"];

pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub const ROOT: NodeId = NodeId(0);

    pub fn parse(html: &str) -> Self {
        let mut builder = TreeBuilder::new();
        builder.run(html);
        Document {
            nodes: builder.nodes,
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(name))
    }

    fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.element(id).is_some_and(|el| el.name == tag)
    }

    /// Every node below `scope`, in document order.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[scope.0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Every `<tag>` element below `scope`, in document order.
    pub fn find_all(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.is_tag(*id, tag))
            .collect()
    }

    pub fn find(&self, scope: NodeId, tag: &str) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| self.is_tag(*id, tag))
    }

    /// The first `<tag>` below `scope` whose `attr` equals `value`.
    pub fn find_with_attr(&self, scope: NodeId, tag: &str, attr: &str, value: &str) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| self.is_tag(*id, tag) && self.attr(*id, attr) == Some(value))
    }

    /// The first `<tag>` below `scope` carrying `class`.
    pub fn find_with_class(&self, scope: NodeId, tag: &str, class: &str) -> Option<NodeId> {
        self.descendants(scope).into_iter().find(|id| {
            self.element(*id)
                .is_some_and(|el| el.name == tag && el.has_class(class))
        })
    }

    /// The first `<tag>` anywhere after `from` in document order.
    pub fn find_next(&self, from: NodeId, tag: &str) -> Option<NodeId> {
        (from.0 + 1..self.nodes.len())
            .map(NodeId)
            .find(|id| self.is_tag(*id, tag))
    }

    /// Raw text of `scope`: every text node below it, concatenated.
    pub fn text(&self, scope: NodeId) -> String {
        self.text_nodes(scope).concat()
    }

    /// Text of `scope` with each text node trimmed, empties dropped, and the
    /// rest joined by `sep`.
    pub fn text_joined(&self, scope: NodeId, sep: &str) -> String {
        self.text_nodes(scope)
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(sep)
    }

    fn text_nodes(&self, scope: NodeId) -> Vec<&str> {
        let mut ids = vec![scope];
        ids.extend(self.descendants(scope));
        ids.into_iter()
            .filter_map(|id| match &self.nodes[id.0].data {
                NodeData::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

struct TreeBuilder {
    nodes: Vec<Node>,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                children: Vec::new(),
                data: NodeData::Root,
            }],
            open: vec![Document::ROOT],
        }
    }

    fn current(&self) -> NodeId {
        *self.open.last().unwrap_or(&Document::ROOT)
    }

    fn append(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = self.current();
        self.nodes.push(Node {
            children: Vec::new(),
            data,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn open_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el.name.as_str()),
            _ => None,
        }
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw).into_owned();
        self.append(NodeData::Text(text));
    }

    /// Pop up to and including the innermost open `name`, if it is open.
    fn close(&mut self, name: &str) {
        if let Some(pos) = self
            .open
            .iter()
            .rposition(|id| self.open_name(*id) == Some(name))
        {
            self.open.truncate(pos);
        }
    }

    /// Close an open `<p>` unless a scope boundary sits above it.
    fn close_paragraph_in_scope(&mut self) {
        for (pos, id) in self.open.iter().enumerate().rev() {
            match self.open_name(*id) {
                Some("p") => {
                    self.open.truncate(pos);
                    return;
                }
                Some(name) if SCOPE_BOUNDARIES.contains(&name) => return,
                _ => {}
            }
        }
    }

    fn start_tag(&mut self, el: Element, self_closing: bool) {
        if CLOSES_PARAGRAPH.contains(&el.name.as_str()) {
            self.close_paragraph_in_scope();
        }
        if el.name == "li" {
            self.close_sibling("li", &["ul", "ol"]);
        }
        let leaf = self_closing || VOID_ELEMENTS.contains(&el.name.as_str());
        let id = self.append(NodeData::Element(el));
        if !leaf {
            self.open.push(id);
        }
    }

    /// Close an open `tag` if no `boundaries` element sits above it.
    fn close_sibling(&mut self, tag: &str, boundaries: &[&str]) {
        for (pos, id) in self.open.iter().enumerate().rev() {
            match self.open_name(*id) {
                Some(name) if name == tag => {
                    self.open.truncate(pos);
                    return;
                }
                Some(name) if boundaries.contains(&name) => return,
                _ => {}
            }
        }
    }

    fn run(&mut self, html: &str) {
        let bytes = html.as_bytes();
        let mut i = 0;
        let mut text_start = 0;

        while i < bytes.len() {
            if bytes[i] != b'<' {
                i += 1;
                continue;
            }
            let rest = &html[i..];
            let next = bytes.get(i + 1).copied();

            if rest.starts_with("<!--") {
                self.push_text(&html[text_start..i]);
                i = rest[4..].find("-->").map_or(bytes.len(), |p| i + 4 + p + 3);
                text_start = i;
            } else if matches!(next, Some(b'!') | Some(b'?')) {
                self.push_text(&html[text_start..i]);
                i = rest.find('>').map_or(bytes.len(), |p| i + p + 1);
                text_start = i;
            } else if next == Some(b'/') && bytes.get(i + 2).is_some_and(u8::is_ascii_alphabetic) {
                self.push_text(&html[text_start..i]);
                let (name, end) = read_name(html, i + 2);
                self.close(&name);
                i = html[end..].find('>').map_or(bytes.len(), |p| end + p + 1);
                text_start = i;
            } else if next.is_some_and(|b| b.is_ascii_alphabetic()) {
                self.push_text(&html[text_start..i]);
                let (el, self_closing, end) = read_start_tag(html, i + 1);
                i = end;
                if RAW_TEXT_ELEMENTS.contains(&el.name.as_str()) {
                    let close = format!("</{}", el.name);
                    i = find_ci(html, &close, i)
                        .and_then(|p| html[p..].find('>').map(|q| p + q + 1))
                        .unwrap_or(bytes.len());
                } else {
                    self.start_tag(el, self_closing);
                }
                text_start = i;
            } else {
                i += 1;
            }
        }
        self.push_text(&html[text_start..]);
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn read_name(html: &str, start: usize) -> (String, usize) {
    let bytes = html.as_bytes();
    let mut end = start;
    while end < bytes.len() && is_name_byte(bytes[end]) {
        end += 1;
    }
    (html[start..end].to_ascii_lowercase(), end)
}

/// Parse a start tag whose name begins at `start`. Returns the element,
/// whether it was written self-closing, and the index after `>`.
fn read_start_tag(html: &str, start: usize) -> (Element, bool, usize) {
    let bytes = html.as_bytes();
    let (name, mut i) = read_name(html, start);
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        match bytes.get(i) {
            None => break,
            Some(b'>') => {
                i += 1;
                break;
            }
            Some(b'/') => {
                self_closing = bytes.get(i + 1) == Some(&b'>');
                i += 1;
                continue;
            }
            _ => {}
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let attr_name = html[name_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&q @ (b'"' | b'\'')) => {
                    let vstart = i + 1;
                    let vend = html[vstart..]
                        .find(q as char)
                        .map_or(bytes.len(), |p| vstart + p);
                    value = decode_entities(&html[vstart..vend]).into_owned();
                    i = (vend + 1).min(bytes.len());
                }
                _ => {
                    let vstart = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&html[vstart..i]).into_owned();
                }
            }
        }
        if !attr_name.is_empty() {
            attrs.push((attr_name, value));
        } else if i == name_start {
            // Stray byte that cannot start an attribute.
            i += 1;
        }
    }

    (Element { name, attrs }, self_closing, i)
}

/// Case-insensitive ASCII search for `needle` in `haystack` from `from`.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || from >= hay.len() {
        return None;
    }
    (from..=hay.len().saturating_sub(pat.len()))
        .find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", "\u{a0}"),
    ("aacute", "á"),
    ("eacute", "é"),
    ("iacute", "í"),
    ("oacute", "ó"),
    ("uacute", "ú"),
    ("Aacute", "Á"),
    ("Eacute", "É"),
    ("Iacute", "Í"),
    ("Oacute", "Ó"),
    ("Uacute", "Ú"),
    ("ntilde", "ñ"),
    ("Ntilde", "Ñ"),
    ("uuml", "ü"),
    ("Uuml", "Ü"),
    ("ordm", "º"),
    ("ordf", "ª"),
    ("deg", "°"),
    ("iexcl", "¡"),
    ("iquest", "¿"),
    ("laquo", "«"),
    ("raquo", "»"),
    ("ndash", "–"),
    ("mdash", "—"),
    ("hellip", "…"),
    ("lsquo", "‘"),
    ("rsquo", "’"),
    ("ldquo", "“"),
    ("rdquo", "”"),
    ("middot", "·"),
    ("sect", "§"),
    ("copy", "©"),
    ("reg", "®"),
    ("euro", "€"),
    ("bull", "•"),
];

/// Decode named and numeric character references. Unknown or malformed
/// references are left as written.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_reference(&after[..semi]).map(|d| (d, semi)));
        match decoded {
            Some((text, semi)) => {
                out.push_str(&text);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    NAMED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
}

/// Collapse whitespace runs into single spaces and trim. `None` when empty.
pub fn clean(text: &str) -> Option<String> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}
