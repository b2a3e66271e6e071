// Grammar for the structure definition language, built on nom.
//
// The language is a sequence of declarations and directives:
//
//   u8 foo;                  scalar
//   char name[8];            scalar array
//   u8 flag:1, mode:7;       bitfield group over one backing integer
//   bit bits[8];             bit array, 8 logical bits per byte
//   struct { ... } foo;      anonymous struct instantiation
//   struct mytype { ... };   named struct definition (consumes no space)
//   struct mytype foo[2];    named struct use
//   union { ... } foo;       overlapping members, all the same size
//   #seekto 0x1AB;  #seek 4;  #printoffset "label";
//
// C-style // and /* */ comments are stripped before parsing. The output is
// a plain AST with no behavior; the layout engine walks it separately.

use super::types::ScalarType;
use super::BitwiseError;
use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, map_res, not, opt},
    error::ParseError,
    multi::{many1, separated_list1},
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};
use regex::Regex;

/// One field of a bitfield group: `name:bits`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitDef {
    pub name: String,
    pub bits: usize,
}

/// Inline struct body, or a reference to a named definition
#[derive(Debug, Clone, PartialEq)]
pub enum StructBody {
    Inline(Vec<Decl>),
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    SeekTo(usize),
    Seek(i64),
    PrintOffset(String),
}

/// A single declaration in a definition block
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// `type name;` (count None) or `type name[count];`
    Scalar {
        dtype: ScalarType,
        name: String,
        count: Option<usize>,
    },
    /// `type a:n, b:m, ...;`
    Bitfield {
        dtype: ScalarType,
        fields: Vec<BitDef>,
    },
    /// `struct Name { ... };` -- registers a type, consumes no space
    StructDef { name: String, body: Vec<Decl> },
    /// `struct { ... } name;` / `struct Name inst;` / either with `[count]`
    StructUse {
        body: StructBody,
        name: String,
        count: Option<usize>,
    },
    /// `union { ... } name;`, members overlay at one offset
    Union {
        body: Vec<Decl>,
        name: String,
        count: Option<usize>,
    },
    Directive(Directive),
}

lazy_static! {
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref LINE_COMMENT: Regex = Regex::new(r"//[^\n]*").unwrap();
}

fn strip_comments(source: &str) -> String {
    let no_blocks = BLOCK_COMMENT.replace_all(source, " ");
    LINE_COMMENT.replace_all(&no_blocks, "").into_owned()
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn ws<'a, O, E, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = E>
where
    P: Parser<&'a str, Output = O, Error = E>,
    E: ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

/// Match a keyword with a word boundary after it, so `struct` does not
/// match the front of `structs`
fn kw<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_word_char)))
}

fn symbol(input: &str) -> IResult<&str, &str> {
    take_while1(is_word_char).parse(input)
}

fn integer(input: &str) -> IResult<&str, usize> {
    alt((
        map_res(preceded(tag("0x"), hex_digit1), |s: &str| {
            usize::from_str_radix(s, 16)
        }),
        map_res(digit1, |s: &str| s.parse::<usize>()),
    ))
    .parse(input)
}

fn signed_integer(input: &str) -> IResult<&str, i64> {
    let (input, neg) = opt(char('-')).parse(input)?;
    let (input, value) = integer(input)?;
    let value = value as i64;
    Ok((input, if neg.is_some() { -value } else { value }))
}

fn string_literal(input: &str) -> IResult<&str, String> {
    let (input, body) = delimited(char('"'), opt(is_not("\"")), char('"')).parse(input)?;
    Ok((input, body.unwrap_or("").to_string()))
}

fn scalar_type(input: &str) -> IResult<&str, ScalarType> {
    map_res(symbol, |s: &str| ScalarType::from_keyword(s).ok_or(())).parse(input)
}

fn bitdef(input: &str) -> IResult<&str, BitDef> {
    let (input, name) = symbol(input)?;
    let (input, _) = ws(char(':')).parse(input)?;
    let (input, bits) = integer(input)?;
    Ok((
        input,
        BitDef {
            name: name.to_string(),
            bits,
        },
    ))
}

/// `name[count]`
fn array_suffix(input: &str) -> IResult<&str, (String, usize)> {
    let (input, name) = symbol(input)?;
    let (input, count) = delimited(ws(char('[')), integer, ws(char(']'))).parse(input)?;
    Ok((input, (name.to_string(), count)))
}

fn definition(input: &str) -> IResult<&str, Decl> {
    let (input, dtype) = scalar_type(input)?;
    let (input, _) = multispace1(input)?;
    let (input, decl) = alt((
        map(array_suffix, move |(name, count)| Decl::Scalar {
            dtype,
            name,
            count: Some(count),
        }),
        map(
            separated_list1(ws(char(',')), bitdef),
            move |fields| Decl::Bitfield { dtype, fields },
        ),
        map(symbol, move |name: &str| Decl::Scalar {
            dtype,
            name: name.to_string(),
            count: None,
        }),
    ))
    .parse(input)?;
    let (input, _) = ws(char(';')).parse(input)?;
    Ok((input, decl))
}

fn directive(input: &str) -> IResult<&str, Decl> {
    let (input, _) = char('#').parse(input)?;
    let (input, d) = alt((
        map(
            preceded((tag("seekto"), multispace1), integer),
            Directive::SeekTo,
        ),
        map(
            preceded((tag("seek"), multispace1), signed_integer),
            Directive::Seek,
        ),
        map(
            preceded((tag("printoffset"), multispace0), string_literal),
            Directive::PrintOffset,
        ),
    ))
    .parse(input)?;
    let (input, _) = ws(char(';')).parse(input)?;
    Ok((input, Decl::Directive(d)))
}

fn block(input: &str) -> IResult<&str, Vec<Decl>> {
    delimited(ws(char('{')), many1(ws(item)), ws(char('}'))).parse(input)
}

/// Trailing `name;` or `name[count];` of a struct/union instantiation
fn instance(input: &str) -> IResult<&str, (String, Option<usize>)> {
    alt((
        map(ws(array_suffix), |(name, count)| (name, Some(count))),
        map(ws(symbol), |name: &str| (name.to_string(), None)),
    ))
    .parse(input)
}

fn struct_defn(input: &str) -> IResult<&str, Decl> {
    let (input, name) = ws(symbol).parse(input)?;
    let (input, body) = block(input)?;
    let (input, _) = ws(char(';')).parse(input)?;
    Ok((
        input,
        Decl::StructDef {
            name: name.to_string(),
            body,
        },
    ))
}

fn struct_use(input: &str) -> IResult<&str, Decl> {
    let (input, body) = alt((
        map(block, StructBody::Inline),
        map(ws(symbol), |name: &str| StructBody::Named(name.to_string())),
    ))
    .parse(input)?;
    let (input, (name, count)) = instance(input)?;
    let (input, _) = ws(char(';')).parse(input)?;
    Ok((input, Decl::StructUse { body, name, count }))
}

fn struct_item(input: &str) -> IResult<&str, Decl> {
    let (input, _) = kw("struct").parse(input)?;
    alt((struct_defn, struct_use)).parse(input)
}

fn union_item(input: &str) -> IResult<&str, Decl> {
    let (input, _) = kw("union").parse(input)?;
    let (input, body) = block(input)?;
    let (input, (name, count)) = instance(input)?;
    let (input, _) = ws(char(';')).parse(input)?;
    Ok((input, Decl::Union { body, name, count }))
}

fn item(input: &str) -> IResult<&str, Decl> {
    alt((directive, struct_item, union_item, definition)).parse(input)
}

fn snippet(input: &str) -> String {
    let line = input.trim_start().lines().next().unwrap_or("");
    line.chars().take(40).collect()
}

/// Parse definition source text into an AST. All syntax problems surface
/// here, before any data element is constructed.
pub fn parse_definition(source: &str) -> Result<Vec<Decl>, BitwiseError> {
    let cleaned = strip_comments(source);
    // bind before matching so the parser temporary does not outlive `cleaned`
    let result = all_consuming(many1(ws(item))).parse(cleaned.as_str());
    match result {
        Ok((_, decls)) => Ok(decls),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(BitwiseError::Syntax(format!(
            "invalid definition near `{}`",
            snippet(e.input)
        ))),
        Err(nom::Err::Incomplete(_)) => {
            Err(BitwiseError::Syntax("unexpected end of definition".into()))
        }
    }
}
