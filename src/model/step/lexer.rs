//! ISO-10303-21 DATA section scanner and entity tokenizer.
//!
//! The scanner finds instance boundaries with `memchr`; each instance is
//! then parsed with nom combinators into owned [`Value`]s.

use memchr::{memchr, memchr2, memchr3};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{opt, recognize, value},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, preceded},
    IResult, Parser,
};

/// One attribute value of an entity instance.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `#123`
    Ref(u32),
    /// `'text'`, already unescaped
    Str(String),
    Int(i64),
    Real(f64),
    /// `.NAME.`
    Enum(String),
    List(Vec<Value>),
    /// `TYPE(args)` inside an attribute list
    Typed(String, Vec<Value>),
    /// `$`
    Null,
    /// `*`
    Derived,
}

impl Value {
    pub fn as_ref_id(&self) -> Option<u32> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Every entity reference directly or transitively inside this value.
    pub fn collect_refs(&self, out: &mut Vec<u32>) {
        match self {
            Self::Ref(id) => out.push(*id),
            Self::List(items) | Self::Typed(_, items) => {
                items.iter().for_each(|v| v.collect_refs(out))
            }
            _ => {}
        }
    }
}

/// A parsed instance. Simple instances have one record; complex
/// instances (`#1=(A() B());`) have one record per partial type.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub records: Vec<(String, Vec<Value>)>,
}

impl Entity {
    /// Type name of a simple instance; `None` for a complex one.
    pub fn simple_type(&self) -> Option<&str> {
        match self.records.as_slice() {
            [(name, _)] => Some(name),
            _ => None,
        }
    }

    /// Attributes of a simple instance of type `name`.
    pub fn args_if(&self, name: &str) -> Option<&[Value]> {
        match self.records.as_slice() {
            [(ty, args)] if ty == name => Some(args),
            _ => None,
        }
    }

    /// True if any partial record has type `name`.
    pub fn has_record(&self, name: &str) -> bool {
        self.records.iter().any(|(ty, _)| ty == name)
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.records.first().and_then(|(_, args)| args.get(index))
    }
}

/// Byte ranges of every `#id=...;` instance in the DATA section.
pub struct EntityScanner<'a> {
    content: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> EntityScanner<'a> {
    pub fn new(content: &'a str) -> Self {
        let pos = content.find("DATA;").map_or(0, |p| p + 5);
        let end = content[pos..].find("ENDSEC;").map_or(content.len(), |p| pos + p);
        Self { content, pos, end }
    }
}

impl<'a> Iterator for EntityScanner<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let bytes = &self.content.as_bytes()[..self.end];

        // Start of the next instance, skipping comments between instances.
        let start = loop {
            let hit = self.pos + memchr2(b'#', b'/', &bytes[self.pos..])?;
            if bytes[hit] == b'#' {
                break hit;
            }
            self.pos = self.skip_comment(hit)?;
        };

        // Terminating ';' outside of strings and comments.
        let mut pos = start;
        loop {
            let hit = pos + memchr3(b'\'', b';', b'/', &bytes[pos..])?;
            match bytes[hit] {
                b';' => {
                    self.pos = hit + 1;
                    return Some(&self.content[start..=hit]);
                }
                b'\'' => {
                    let mut p = hit + 1;
                    pos = loop {
                        let quote = p + memchr(b'\'', &bytes[p..])?;
                        if bytes.get(quote + 1) == Some(&b'\'') {
                            p = quote + 2;
                        } else {
                            break quote + 1;
                        }
                    };
                }
                _ => pos = self.skip_comment(hit)?,
            }
        }
    }
}

impl EntityScanner<'_> {
    /// Position after a `/* */` comment starting at `slash`, or just past a lone `/`.
    fn skip_comment(&self, slash: usize) -> Option<usize> {
        if self.content.as_bytes().get(slash + 1) != Some(&b'*') {
            return Some(slash + 1);
        }
        let close = self.content[slash + 2..self.end].find("*/")?;
        Some(slash + 2 + close + 2)
    }
}

/// Whitespace and `/* */` comments.
fn ws(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), (tag("/*"), take_until("*/"), tag("*/"))),
        ))),
    )
    .parse(input)
}

fn keyword(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

fn entity_ref(input: &str) -> IResult<&str, Value> {
    let (input, digits) = preceded(char('#'), take_while1(|c: char| c.is_ascii_digit())).parse(input)?;
    let id = digits
        .parse::<u32>()
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
    Ok((input, Value::Ref(id)))
}

/// `'...'` with `''` escapes; the body may contain any character.
fn step_string(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('\'')(input)?;
    let bytes = input.as_bytes();
    let mut end = 0;
    while end < bytes.len() {
        if bytes[end] == b'\'' {
            if bytes.get(end + 1) == Some(&b'\'') {
                end += 2;
                continue;
            }
            return Ok((&input[end + 1..], Value::Str(decode_string(&input[..end]))));
        }
        end += 1;
    }
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))
}

fn number(input: &str) -> IResult<&str, Value> {
    let (input, text) = recognize((
        opt(alt((char('-'), char('+')))),
        take_while1(|c: char| c.is_ascii_digit()),
        opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit()))),
        opt((
            alt((char('e'), char('E'))),
            opt(alt((char('+'), char('-')))),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
    ))
    .parse(input)?;

    let bad = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float));
    if text.contains(['.', 'e', 'E']) {
        Ok((input, Value::Real(text.parse().map_err(|_| bad())?)))
    } else {
        Ok((input, Value::Int(text.parse().map_err(|_| bad())?)))
    }
}

fn enumeration(input: &str) -> IResult<&str, Value> {
    let (input, name) = delimited(char('.'), keyword, char('.')).parse(input)?;
    Ok((input, Value::Enum(name.to_string())))
}

fn arg_list(input: &str) -> IResult<&str, Vec<Value>> {
    delimited(
        pair(char('('), ws),
        separated_list0((ws, char(','), ws), token),
        pair(ws, char(')')),
    )
    .parse(input)
}

fn list_value(input: &str) -> IResult<&str, Value> {
    let (input, items) = arg_list(input)?;
    Ok((input, Value::List(items)))
}

fn typed_value(input: &str) -> IResult<&str, Value> {
    let (input, (name, args)) = (keyword, preceded(ws, arg_list)).parse(input)?;
    Ok((input, Value::Typed(name.to_string(), args)))
}

fn token(input: &str) -> IResult<&str, Value> {
    alt((
        entity_ref,
        step_string,
        value(Value::Null, char('$')),
        value(Value::Derived, char('*')),
        enumeration,
        number,
        list_value,
        typed_value,
    ))
    .parse(input)
}

fn record(input: &str) -> IResult<&str, (String, Vec<Value>)> {
    let (input, (name, args)) = (keyword, preceded(ws, arg_list)).parse(input)?;
    Ok((input, (name.to_ascii_uppercase(), args)))
}

fn simple_records(input: &str) -> IResult<&str, Vec<(String, Vec<Value>)>> {
    let (input, r) = record(input)?;
    Ok((input, vec![r]))
}

fn complex_records(input: &str) -> IResult<&str, Vec<(String, Vec<Value>)>> {
    delimited(pair(char('('), ws), many1(delimited(ws, record, ws)), char(')')).parse(input)
}

fn instance(input: &str) -> IResult<&str, Entity> {
    let (input, _) = ws(input)?;
    let (input, id) = preceded(char('#'), take_while1(|c: char| c.is_ascii_digit())).parse(input)?;
    let (input, _) = (ws, char('='), ws).parse(input)?;
    let (input, records) = alt((simple_records, complex_records)).parse(input)?;
    let (input, _) = (ws, char(';')).parse(input)?;

    let id = id
        .parse()
        .map_err(|_| nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
    Ok((input, Entity { id, records }))
}

/// Parse one `#id=TYPE(...);` instance.
pub fn parse_entity(text: &str) -> Result<Entity, String> {
    match instance(text) {
        Ok((_, entity)) => Ok(entity),
        Err(e) => {
            let head: String = text.chars().take(60).collect();
            Err(format!("malformed instance {head:?}: {e}"))
        }
    }
}

/// Undo STEP string escapes: `''`, `\\`, `\X\hh`, `\X2\hhhh...\X0\`, `\S\c`.
fn decode_string(raw: &str) -> String {
    if !raw.contains(['\'', '\\']) {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if c == '\'' && rest.starts_with("''") {
            out.push('\'');
            rest = &rest[2..];
        } else if let Some(tail) = rest.strip_prefix("\\\\") {
            out.push('\\');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            let units: Vec<u16> = tail[..end]
                .as_bytes()
                .chunks(4)
                .filter_map(|h| std::str::from_utf8(h).ok())
                .filter_map(|h| u16::from_str_radix(h, 16).ok())
                .collect();
            out.extend(char::decode_utf16(units).map(|r| r.unwrap_or('\u{FFFD}')));
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(tail) = rest.strip_prefix("\\X\\") {
            match tail.get(..2).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                Some(byte) => {
                    out.push(char::from(byte));
                    rest = &tail[2..];
                }
                None => {
                    out.push('\\');
                    rest = &rest[1..];
                }
            }
        } else if let Some(tail) = rest.strip_prefix("\\S\\") {
            match tail.chars().next() {
                Some(ch) => {
                    out.push(char::from_u32(ch as u32 + 128).unwrap_or(ch));
                    rest = &tail[ch.len_utf8()..];
                }
                None => rest = tail,
            }
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}
