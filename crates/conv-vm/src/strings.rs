//! Local strings and `@` placeholder expansion.

/// The conversation's string block plus strings allocated at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalStrings {
    strings: Vec<String>,
}

impl LocalStrings {
    pub fn new(strings: Vec<String>) -> Self {
        Self { strings }
    }

    pub fn get(&self, id: u16) -> Option<&str> {
        self.strings.get(id as usize).map(String::as_str)
    }

    /// Append a string and return its id.
    pub fn alloc(&mut self, text: impl Into<String>) -> u16 {
        let id = self.strings.len() as u16;
        self.strings.push(text.into());
        id
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Where a placeholder reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderSource {
    /// `G`: a global slot.
    Global,
    /// `S`: the frame slot at `bp + n`.
    Frame,
    /// `P`: the slot pointed to by the frame slot at `bp + n`.
    Pointer,
}

/// How a placeholder value is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// `S`: the value is a local string id.
    String,
    /// `I`: the value is printed as a decimal integer.
    Integer,
}

/// One parsed `@XYn` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub source: PlaceholderSource,
    pub kind: PlaceholderKind,
    pub param: i32,
    /// Length of the placeholder text in bytes.
    pub len: usize,
}

/// Parse the placeholder at the start of `text`, which must begin with `@`.
pub fn parse_placeholder(text: &str) -> Option<Placeholder> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'@') || bytes.len() < 3 {
        return None;
    }
    let source = match bytes[1] {
        b'G' => PlaceholderSource::Global,
        b'S' => PlaceholderSource::Frame,
        b'P' => PlaceholderSource::Pointer,
        _ => return None,
    };
    let kind = match bytes[2] {
        b'S' => PlaceholderKind::String,
        b'I' => PlaceholderKind::Integer,
        _ => return None,
    };

    let rest = &text[3..];
    let sign_len = usize::from(rest.starts_with('-'));
    let digits = rest[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    let number = &rest[..sign_len + digits];
    let param = if digits == 0 { 0 } else { number.parse().ok()? };
    Some(Placeholder {
        source,
        kind,
        param,
        len: 3 + if digits == 0 { 0 } else { number.len() },
    })
}

/// Replace every placeholder in `text`.
///
/// `read` maps a placeholder to its raw value, `string` resolves string ids.
/// Text that is not a well-formed placeholder is copied unchanged.
pub fn expand_with(
    text: &str,
    mut read: impl FnMut(&Placeholder) -> u16,
    string: impl Fn(u16) -> String,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];
        match parse_placeholder(rest) {
            Some(placeholder) => {
                let value = read(&placeholder);
                match placeholder.kind {
                    PlaceholderKind::String => out.push_str(&string(value)),
                    PlaceholderKind::Integer => out.push_str(&value.to_string()),
                }
                rest = &rest[placeholder.len..];
            }
            None => {
                out.push('@');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_kind_and_signed_param() {
        let p = parse_placeholder("@GS12 rest").unwrap();
        assert_eq!(p.source, PlaceholderSource::Global);
        assert_eq!(p.kind, PlaceholderKind::String);
        assert_eq!(p.param, 12);
        assert_eq!(p.len, 5);

        let p = parse_placeholder("@PI-3").unwrap();
        assert_eq!(p.source, PlaceholderSource::Pointer);
        assert_eq!(p.param, -3);
        assert_eq!(p.len, 5);

        assert!(parse_placeholder("@XS1").is_none());
        assert!(parse_placeholder("@G").is_none());
    }

    #[test]
    fn expands_and_keeps_stray_at_signs() {
        let text = expand_with(
            "Hello @GS0, you owe @SI2 coins @ once",
            |p| match p.source {
                PlaceholderSource::Global => 1,
                _ => 42,
            },
            |id| format!("name{id}"),
        );
        assert_eq!(text, "Hello name1, you owe 42 coins @ once");
    }

    #[test]
    fn alloc_returns_sequential_ids() {
        let mut strings = LocalStrings::new(vec!["a".into(), "b".into()]);
        assert_eq!(strings.alloc("c"), 2);
        assert_eq!(strings.get(2), Some("c"));
        assert_eq!(strings.get(3), None);
        assert_eq!(strings.len(), 3);
    }
}
