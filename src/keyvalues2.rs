//! Decoding of the KeyValues2 text encoding into an element tree.

use std::{
    io::{BufRead, Error},
    str::{FromStr, SplitWhitespace},
    time::Duration,
};

use indexmap::IndexMap;
use thiserror::Error as ThisError;
use uuid::Uuid as UUID;

use crate::{
    Attribute, Element,
    attribute::{Angle, BinaryBlock, Color, Matrix, Quaternion, Vector2, Vector3, Vector4},
};

#[derive(Debug, ThisError)]
pub enum Keyvalues2DecodeError {
    #[error("IO Error: {0}")]
    Io(#[from] Error),
    #[error("Unmatched Closing Delimiter On Line: {0}")]
    UnmatchedClose(usize),
    #[error("Missing Element Body On Line: {0}")]
    MissingElementBody(usize),
    #[error("Missing Array Body On Line: {0}")]
    MissingArrayBody(usize),
    #[error("Unexpected Token On Line: {0}")]
    UnexpectedToken(usize),
    #[error("Failed To Parse Integer On Line: {0}")]
    FailedToParseInteger(usize),
    #[error("Failed To Parse Float On Line: {0}")]
    FailedToParseFloat(usize),
    #[error("Failed To Parse UUID On Line: {0}")]
    FailedToParseUUID(usize),
    #[error("Invalid Attribute On Line: {0}")]
    InvalidAttribute(usize),
    #[error("Duplicate Element Id: {0}")]
    DuplicateElementId(UUID),
    #[error("Referenced Element Id Was Never Declared: {0}")]
    UndeclaredIdentifier(UUID),
}

/// Classification of one input line. Structural markers win over word
/// content, so a line may carry both words and a classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineKind {
    Header,
    Value,
    OpenElement,
    OpenArray,
    CloseElement,
    CloseArray,
    EndOfInput,
}

struct Line {
    kind: LineKind,
    words: Vec<String>,
}

struct LineReader<B: BufRead> {
    buffer: B,
    line_number: usize,
}

impl<B: BufRead> LineReader<B> {
    fn new(buffer: B) -> Self {
        Self { buffer, line_number: 0 }
    }

    fn next_line(&mut self) -> Result<Line, Keyvalues2DecodeError> {
        let mut raw = String::new();
        if self.buffer.read_line(&mut raw)? == 0 {
            return Ok(Line {
                kind: LineKind::EndOfInput,
                words: Vec::new(),
            });
        }
        self.line_number += 1;

        if raw.starts_with('<') {
            return Ok(Line {
                kind: LineKind::Header,
                words: Vec::new(),
            });
        }

        let mut kind = LineKind::Value;
        let mut words = Vec::new();
        let mut word = String::new();
        let mut in_quote = false;

        for character in raw.chars() {
            match character {
                '"' if in_quote => {
                    words.push(std::mem::take(&mut word));
                    in_quote = false;
                }
                '"' => in_quote = true,
                '{' => kind = LineKind::OpenElement,
                '}' => kind = LineKind::CloseElement,
                '[' => kind = LineKind::OpenArray,
                ']' => kind = LineKind::CloseArray,
                // unquoted commas separate array entries and are not word characters
                character if (character.is_whitespace() || character == ',') && !in_quote => {
                    if !word.is_empty() {
                        words.push(std::mem::take(&mut word));
                    }
                }
                character => word.push(character),
            }
        }

        if !word.is_empty() {
            words.push(word);
        }

        Ok(Line { kind, words })
    }
}

/// Semantic value kind of a type keyword, with any `_array` qualifier
/// stripped. Array-ness is known to the caller from parse context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttributeKind {
    Integer,
    Float,
    Boolean,
    String,
    Binary,
    Time,
    Color,
    Vector2,
    Vector3,
    Vector4,
    Angle,
    Quaternion,
    Matrix,
    Element,
    Unknown,
}

fn resolve_attribute_kind(keyword: &str) -> AttributeKind {
    match keyword.strip_suffix("_array").unwrap_or(keyword) {
        "int" => AttributeKind::Integer,
        "float" => AttributeKind::Float,
        "bool" => AttributeKind::Boolean,
        "string" => AttributeKind::String,
        "binary" => AttributeKind::Binary,
        "time" => AttributeKind::Time,
        "color" => AttributeKind::Color,
        "vector2" => AttributeKind::Vector2,
        "vector3" => AttributeKind::Vector3,
        "vector4" => AttributeKind::Vector4,
        "qangle" => AttributeKind::Angle,
        "quaternion" => AttributeKind::Quaternion,
        "matrix" => AttributeKind::Matrix,
        "element" | "elementid" => AttributeKind::Element,
        _ => AttributeKind::Unknown,
    }
}

enum PendingSlot {
    Scalar { owner: Element, attribute: String },
    Indexed { owner: Element, attribute: String, index: usize },
}

#[derive(Default)]
struct LinkRecord {
    target: Option<Element>,
    pending: Vec<PendingSlot>,
}

struct Decoder<B: BufRead> {
    reader: LineReader<B>,
    links: IndexMap<UUID, LinkRecord>,
}

/// Decodes one KeyValues2 document into its root element.
///
/// Cross-references by identifier are resolved before the tree is returned,
/// regardless of declaration order; an identifier that is referenced but
/// never declared fails the whole decode.
pub fn decode(buffer: &mut impl BufRead) -> Result<Element, Keyvalues2DecodeError> {
    let mut decoder = Decoder {
        reader: LineReader::new(buffer),
        links: IndexMap::new(),
    };

    let mut root = None;

    loop {
        let line = decoder.reader.next_line()?;
        match line.kind {
            LineKind::EndOfInput => break,
            LineKind::Header => continue,
            LineKind::CloseElement | LineKind::CloseArray => {
                return Err(Keyvalues2DecodeError::UnmatchedClose(decoder.reader.line_number));
            }
            LineKind::Value if line.words.len() == 1 => {
                let class = line.words.into_iter().next().unwrap_or_default();
                let opener = decoder.reader.next_line()?;
                if opener.kind != LineKind::OpenElement {
                    return Err(Keyvalues2DecodeError::MissingElementBody(decoder.reader.line_number));
                }
                let element = decoder.read_element(class)?;
                if root.is_none() {
                    root = Some(element);
                }
            }
            LineKind::OpenElement if line.words.len() == 1 => {
                let class = line.words.into_iter().next().unwrap_or_default();
                let element = decoder.read_element(class)?;
                if root.is_none() {
                    root = Some(element);
                }
            }
            _ => continue,
        }
    }

    decoder.resolve_links()?;

    Ok(root.unwrap_or_default())
}

impl<B: BufRead> Decoder<B> {
    fn read_element(&mut self, class: String) -> Result<Element, Keyvalues2DecodeError> {
        let mut element = Element::class(class);

        loop {
            let line = self.reader.next_line()?;

            match line.kind {
                // end of input implicitly closes every open structure
                LineKind::CloseElement | LineKind::EndOfInput => return Ok(element),
                LineKind::CloseArray => return Err(Keyvalues2DecodeError::UnmatchedClose(self.reader.line_number)),
                LineKind::Header => continue,
                LineKind::OpenElement | LineKind::OpenArray if line.words.is_empty() => {
                    return Err(Keyvalues2DecodeError::UnexpectedToken(self.reader.line_number));
                }
                LineKind::Value | LineKind::OpenElement | LineKind::OpenArray => {}
            }

            if line.words.len() < 2 {
                // stray single words and blank lines are skipped
                continue;
            }

            self.read_attribute(&mut element, line)?;
        }
    }

    fn read_attribute(&mut self, element: &mut Element, line: Line) -> Result<(), Keyvalues2DecodeError> {
        let line_number = self.reader.line_number;
        let mut words = line.words.into_iter();
        let name = words.next().unwrap_or_default();
        let type_word = words.next().unwrap_or_default();
        let value = words.next();
        let kind = resolve_attribute_kind(&type_word);

        // the name attribute folds into the element itself
        if name == "name" && kind == AttributeKind::String {
            if let Some(value) = value {
                element.set_name(value);
            }
            return Ok(());
        }

        match kind {
            AttributeKind::Element => match value {
                Some(value) if type_word == "elementid" => {
                    // the identifier names this element, not a child
                    let id = parse_uuid(&value, line_number)?;
                    element.set_id(id);
                    let record = self.links.entry(id).or_default();
                    if record.target.is_some() {
                        return Err(Keyvalues2DecodeError::DuplicateElementId(id));
                    }
                    record.target = Some(element.clone());
                }
                Some(value) => {
                    if value.is_empty() {
                        element.set_attribute(name, Attribute::Element(None));
                        return Ok(());
                    }
                    let id = parse_uuid(&value, line_number)?;
                    let record = self.links.entry(id).or_default();
                    match record.target.clone() {
                        Some(target) => {
                            element.set_attribute(name, Attribute::Element(Some(target)));
                        }
                        None => {
                            record.pending.push(PendingSlot::Scalar {
                                owner: element.clone(),
                                attribute: name.clone(),
                            });
                            element.set_attribute(name, Attribute::Element(None));
                        }
                    }
                }
                None if type_word == "element_array" => match self.read_opener(line.kind)? {
                    LineKind::OpenArray => {
                        let values = self.read_element_array(element, &name)?;
                        element.set_attribute(name, Attribute::ElementArray(values));
                    }
                    _ => return Err(Keyvalues2DecodeError::MissingArrayBody(self.reader.line_number)),
                },
                None => match self.read_opener(line.kind)? {
                    LineKind::OpenElement => {
                        let nested = self.read_element(type_word)?;
                        element.set_attribute(name, Attribute::Element(Some(nested)));
                    }
                    _ => return Err(Keyvalues2DecodeError::MissingElementBody(self.reader.line_number)),
                },
            },
            AttributeKind::Unknown => match value {
                // unknown scalar types are dropped for schema forward compatibility
                Some(_) => {}
                None => match self.read_opener(line.kind)? {
                    // an unknown two word declaration is an inline element
                    // whose class is the type word itself
                    LineKind::OpenElement => {
                        let nested = self.read_element(type_word)?;
                        element.set_attribute(name, Attribute::Element(Some(nested)));
                    }
                    LineKind::OpenArray => self.skip_array_body()?,
                    _ => return Err(Keyvalues2DecodeError::MissingElementBody(self.reader.line_number)),
                },
            },
            _ => match value {
                Some(value) => {
                    let attribute = read_scalar(kind, &value, line_number)?;
                    element.set_attribute(name, attribute);
                }
                None => match self.read_opener(line.kind)? {
                    LineKind::OpenArray => {
                        let attribute = self.read_array(kind)?;
                        element.set_attribute(name, attribute);
                    }
                    _ => return Err(Keyvalues2DecodeError::MissingArrayBody(self.reader.line_number)),
                },
            },
        }

        Ok(())
    }

    /// Returns the structural marker for a declaration, whether it sits on
    /// the declaration line itself or on the following line.
    fn read_opener(&mut self, declared: LineKind) -> Result<LineKind, Keyvalues2DecodeError> {
        match declared {
            LineKind::OpenElement | LineKind::OpenArray => Ok(declared),
            _ => Ok(self.reader.next_line()?.kind),
        }
    }

    fn read_element_array(&mut self, owner: &Element, attribute: &str) -> Result<Vec<Option<Element>>, Keyvalues2DecodeError> {
        let mut values: Vec<Option<Element>> = Vec::new();

        loop {
            let line = self.reader.next_line()?;
            match line.kind {
                LineKind::CloseArray | LineKind::EndOfInput => break,
                LineKind::CloseElement => return Err(Keyvalues2DecodeError::UnmatchedClose(self.reader.line_number)),
                LineKind::Header => continue,
                LineKind::OpenElement => match line.words.len() {
                    1 => {
                        let class = line.words.into_iter().next().unwrap_or_default();
                        values.push(Some(self.read_element(class)?));
                    }
                    _ => return Err(Keyvalues2DecodeError::UnexpectedToken(self.reader.line_number)),
                },
                LineKind::Value | LineKind::OpenArray => match line.words.len() {
                    0 => continue,
                    1 => {
                        let class = line.words.into_iter().next().unwrap_or_default();
                        let opener = self.reader.next_line()?;
                        if opener.kind != LineKind::OpenElement {
                            return Err(Keyvalues2DecodeError::MissingElementBody(self.reader.line_number));
                        }
                        values.push(Some(self.read_element(class)?));
                    }
                    _ => {
                        // `"element" "<identifier>"` occupies the next index,
                        // bound now or once the identifier is declared
                        let id_word = &line.words[1];
                        if id_word.is_empty() {
                            values.push(None);
                            continue;
                        }
                        let id = parse_uuid(id_word, self.reader.line_number)?;
                        let index = values.len();
                        let record = self.links.entry(id).or_default();
                        match record.target.clone() {
                            Some(target) => values.push(Some(target)),
                            None => {
                                record.pending.push(PendingSlot::Indexed {
                                    owner: owner.clone(),
                                    attribute: attribute.to_string(),
                                    index,
                                });
                                values.push(None);
                            }
                        }
                    }
                },
            }
        }

        Ok(values)
    }

    fn read_array(&mut self, kind: AttributeKind) -> Result<Attribute, Keyvalues2DecodeError> {
        let mut values = Vec::new();

        loop {
            let line = self.reader.next_line()?;
            match line.kind {
                LineKind::CloseArray | LineKind::EndOfInput => break,
                LineKind::CloseElement => return Err(Keyvalues2DecodeError::UnmatchedClose(self.reader.line_number)),
                LineKind::Header => continue,
                _ => {
                    if let Some(word) = line.words.into_iter().next() {
                        values.push((word, self.reader.line_number));
                    }
                }
            }
        }

        let attribute = match kind {
            AttributeKind::Integer => Attribute::IntegerArray(values.iter().map(|(value, line)| parse_integer(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Float => Attribute::FloatArray(values.iter().map(|(value, line)| parse_float(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Boolean => Attribute::BooleanArray(values.iter().map(|(value, line)| parse_boolean(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::String => Attribute::StringArray(values.into_iter().map(|(value, _)| value).collect()),
            AttributeKind::Binary => Attribute::BinaryArray(values.iter().map(|(value, line)| parse_binary(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Time => Attribute::TimeArray(values.iter().map(|(value, line)| parse_time(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Color => Attribute::ColorArray(values.iter().map(|(value, line)| parse_color(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Vector2 => Attribute::Vector2Array(values.iter().map(|(value, line)| parse_vector2(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Vector3 => Attribute::Vector3Array(values.iter().map(|(value, line)| parse_vector3(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Vector4 => Attribute::Vector4Array(values.iter().map(|(value, line)| parse_vector4(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Angle => Attribute::AngleArray(values.iter().map(|(value, line)| parse_angle(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Quaternion => {
                Attribute::QuaternionArray(values.iter().map(|(value, line)| parse_quaternion(value, *line)).collect::<Result<_, _>>()?)
            }
            AttributeKind::Matrix => Attribute::MatrixArray(values.iter().map(|(value, line)| parse_matrix(value, *line)).collect::<Result<_, _>>()?),
            AttributeKind::Element | AttributeKind::Unknown => {
                return Err(Keyvalues2DecodeError::UnexpectedToken(self.reader.line_number));
            }
        };

        Ok(attribute)
    }

    fn skip_array_body(&mut self) -> Result<(), Keyvalues2DecodeError> {
        let mut depth = 1usize;
        loop {
            let line = self.reader.next_line()?;
            match line.kind {
                LineKind::EndOfInput => return Ok(()),
                LineKind::OpenElement | LineKind::OpenArray => depth += 1,
                LineKind::CloseElement | LineKind::CloseArray => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    /// Drains the link table, binding every pending slot. Every identifier
    /// must have been declared as some element's own id by now.
    fn resolve_links(&mut self) -> Result<(), Keyvalues2DecodeError> {
        for (id, record) in std::mem::take(&mut self.links) {
            let target = record.target.ok_or(Keyvalues2DecodeError::UndeclaredIdentifier(id))?;

            for slot in record.pending {
                match slot {
                    PendingSlot::Scalar { mut owner, attribute } => {
                        owner.set_attribute(attribute, Attribute::Element(Some(target.clone())));
                    }
                    PendingSlot::Indexed { mut owner, attribute, index } => {
                        owner.set_element_index(attribute, index, target.clone());
                    }
                }
            }
        }

        Ok(())
    }
}

fn read_scalar(kind: AttributeKind, value: &str, line: usize) -> Result<Attribute, Keyvalues2DecodeError> {
    Ok(match kind {
        AttributeKind::Integer => Attribute::Integer(parse_integer(value, line)?),
        AttributeKind::Float => Attribute::Float(parse_float(value, line)?),
        AttributeKind::Boolean => Attribute::Boolean(parse_boolean(value, line)?),
        AttributeKind::String => Attribute::String(value.to_string()),
        AttributeKind::Binary => Attribute::Binary(parse_binary(value, line)?),
        AttributeKind::Time => Attribute::Time(parse_time(value, line)?),
        AttributeKind::Color => Attribute::Color(parse_color(value, line)?),
        AttributeKind::Vector2 => Attribute::Vector2(parse_vector2(value, line)?),
        AttributeKind::Vector3 => Attribute::Vector3(parse_vector3(value, line)?),
        AttributeKind::Vector4 => Attribute::Vector4(parse_vector4(value, line)?),
        AttributeKind::Angle => Attribute::Angle(parse_angle(value, line)?),
        AttributeKind::Quaternion => Attribute::Quaternion(parse_quaternion(value, line)?),
        AttributeKind::Matrix => Attribute::Matrix(parse_matrix(value, line)?),
        AttributeKind::Element | AttributeKind::Unknown => return Err(Keyvalues2DecodeError::UnexpectedToken(line)),
    })
}

fn parse_integer(value: &str, line: usize) -> Result<i32, Keyvalues2DecodeError> {
    value.parse().map_err(|_| Keyvalues2DecodeError::FailedToParseInteger(line))
}

fn parse_float(value: &str, line: usize) -> Result<f32, Keyvalues2DecodeError> {
    value.parse().map_err(|_| Keyvalues2DecodeError::FailedToParseFloat(line))
}

fn parse_boolean(value: &str, line: usize) -> Result<bool, Keyvalues2DecodeError> {
    let value = value.parse::<u8>().map_err(|_| Keyvalues2DecodeError::FailedToParseInteger(line))?;
    Ok(value != 0)
}

fn parse_time(value: &str, line: usize) -> Result<Duration, Keyvalues2DecodeError> {
    let seconds = value.parse::<f64>().map_err(|_| Keyvalues2DecodeError::FailedToParseFloat(line))?;
    Duration::try_from_secs_f64(seconds).map_err(|_| Keyvalues2DecodeError::FailedToParseFloat(line))
}

fn parse_uuid(value: &str, line: usize) -> Result<UUID, Keyvalues2DecodeError> {
    UUID::from_str(value).map_err(|_| Keyvalues2DecodeError::FailedToParseUUID(line))
}

fn parse_binary(value: &str, line: usize) -> Result<BinaryBlock, Keyvalues2DecodeError> {
    let mut block = BinaryBlock::default();

    for byte in value.chars().filter(|c| !c.is_whitespace()).collect::<Vec<char>>().chunks(2) {
        let byte = byte.iter().collect::<String>();
        block
            .data
            .push(u8::from_str_radix(&byte, 16).map_err(|_| Keyvalues2DecodeError::FailedToParseInteger(line))?);
    }

    Ok(block)
}

fn next_byte(components: &mut SplitWhitespace<'_>, line: usize) -> Result<u8, Keyvalues2DecodeError> {
    components
        .next()
        .ok_or(Keyvalues2DecodeError::InvalidAttribute(line))?
        .parse()
        .map_err(|_| Keyvalues2DecodeError::FailedToParseInteger(line))
}

fn next_component(components: &mut SplitWhitespace<'_>, line: usize) -> Result<f32, Keyvalues2DecodeError> {
    components
        .next()
        .ok_or(Keyvalues2DecodeError::InvalidAttribute(line))?
        .parse()
        .map_err(|_| Keyvalues2DecodeError::FailedToParseFloat(line))
}

fn parse_color(value: &str, line: usize) -> Result<Color, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();

    Ok(Color {
        red: next_byte(&mut components, line)?,
        green: next_byte(&mut components, line)?,
        blue: next_byte(&mut components, line)?,
    })
}

fn parse_vector2(value: &str, line: usize) -> Result<Vector2, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();

    Ok(Vector2 {
        x: next_component(&mut components, line)?,
        y: next_component(&mut components, line)?,
    })
}

fn parse_vector3(value: &str, line: usize) -> Result<Vector3, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();

    Ok(Vector3 {
        x: next_component(&mut components, line)?,
        y: next_component(&mut components, line)?,
        z: next_component(&mut components, line)?,
    })
}

fn parse_vector4(value: &str, line: usize) -> Result<Vector4, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();

    Ok(Vector4 {
        x: next_component(&mut components, line)?,
        y: next_component(&mut components, line)?,
        z: next_component(&mut components, line)?,
        w: next_component(&mut components, line)?,
    })
}

fn parse_angle(value: &str, line: usize) -> Result<Angle, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();

    Ok(Angle {
        pitch: next_component(&mut components, line)?,
        yaw: next_component(&mut components, line)?,
        roll: next_component(&mut components, line)?,
    })
}

fn parse_quaternion(value: &str, line: usize) -> Result<Quaternion, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();

    Ok(Quaternion {
        x: next_component(&mut components, line)?,
        y: next_component(&mut components, line)?,
        z: next_component(&mut components, line)?,
        w: next_component(&mut components, line)?,
    })
}

fn parse_matrix(value: &str, line: usize) -> Result<Matrix, Keyvalues2DecodeError> {
    let mut components = value.split_whitespace();
    let mut entries = [[0f32; 4]; 4];

    for row in entries.iter_mut() {
        for entry in row.iter_mut() {
            *entry = next_component(&mut components, line)?;
        }
    }

    Ok(Matrix { entries })
}
