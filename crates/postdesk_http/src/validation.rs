//! Request body validation for post endpoints.
//!
//! # Responsibility
//! - Turn raw JSON bodies into typed create/patch inputs.
//! - Collect field-level error messages in declaration order.
//!
//! # Invariants
//! - Validation here is shape-only; the title uniqueness rule needs the store
//!   and is checked by the handler.
//! - A present `null` counts as a missing required value.

use postdesk_core::model::post::TITLE_MAX_CHARS;
use postdesk_core::PostPatch;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Minimum `content` length in characters.
pub const CONTENT_MIN_CHARS: usize = 10;

pub const TITLE_TAKEN_MESSAGE: &str = "The title has already been taken.";

/// Field-level validation messages.
///
/// Remembers the first message added so the envelope `message` follows rule
/// order instead of map order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    first: Option<String>,
    by_field: BTreeMap<&'static str, Vec<String>>,
}

impl FieldErrors {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        let message = message.into();
        if self.first.is_none() {
            self.first = Some(message.clone());
        }
        self.by_field.entry(field).or_default().push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    pub fn first_message(&self) -> &str {
        self.first.as_deref().unwrap_or("The given data was invalid.")
    }

    #[cfg(test)]
    pub(crate) fn messages(&self, field: &str) -> &[String] {
        self.by_field.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_field(&self) -> &BTreeMap<&'static str, Vec<String>> {
        &self.by_field
    }
}

/// Validated `POST /posts` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    pub is_published: bool,
}

/// Why a `PUT /posts/{id}` body was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchRejection {
    /// None of the known fields is present.
    NoFields,
    Invalid(FieldErrors),
}

pub fn parse_create_body(body: &[u8]) -> Result<CreatePostInput, FieldErrors> {
    let map = parse_object(body)?;
    let mut reader = FieldReader::new(&map);

    let title = reader.title(true);
    let content = reader.content(true);
    let is_published = reader.is_published(true);

    match (title, content, is_published) {
        (Some(title), Some(content), Some(is_published)) if reader.errors.is_empty() => {
            Ok(CreatePostInput {
                title,
                content,
                is_published,
            })
        }
        _ => Err(reader.errors),
    }
}

pub fn parse_patch_body(body: &[u8]) -> Result<PostPatch, PatchRejection> {
    let map = parse_object(body).map_err(PatchRejection::Invalid)?;
    if ["title", "content", "is_published"]
        .iter()
        .all(|field| !map.contains_key(*field))
    {
        return Err(PatchRejection::NoFields);
    }

    let mut reader = FieldReader::new(&map);
    let patch = PostPatch {
        title: reader.title(false),
        content: reader.content(false),
        is_published: reader.is_published(false),
    };

    if reader.errors.is_empty() {
        Ok(patch)
    } else {
        Err(PatchRejection::Invalid(reader.errors))
    }
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, FieldErrors> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FieldErrors::single(
            "body",
            "The request body must be a JSON object.",
        )),
        Err(err) => Err(FieldErrors::single(
            "body",
            format!("The request body is not valid JSON: {err}"),
        )),
    }
}

struct FieldReader<'a> {
    map: &'a Map<String, Value>,
    errors: FieldErrors,
}

impl<'a> FieldReader<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            errors: FieldErrors::default(),
        }
    }

    fn title(&mut self, required: bool) -> Option<String> {
        let title = self.string("title", required)?;
        if title.chars().count() > TITLE_MAX_CHARS {
            self.errors.add(
                "title",
                format!("The title field must not be greater than {TITLE_MAX_CHARS} characters."),
            );
            return None;
        }
        Some(title)
    }

    fn content(&mut self, required: bool) -> Option<String> {
        let content = self.string("content", required)?;
        if content.chars().count() < CONTENT_MIN_CHARS {
            self.errors.add(
                "content",
                format!("The content field must be at least {CONTENT_MIN_CHARS} characters."),
            );
            return None;
        }
        Some(content)
    }

    fn is_published(&mut self, required: bool) -> Option<bool> {
        let value = self.present("is_published", required)?;
        let parsed = match value {
            Value::Bool(flag) => Some(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(text) => match text.as_str() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.errors
                .add("is_published", "The is_published field must be true or false.");
        }
        parsed
    }

    fn string(&mut self, field: &'static str, required: bool) -> Option<String> {
        match self.present(field, required)? {
            Value::String(text) if text.trim().is_empty() => {
                self.errors.add(field, required_message(field));
                None
            }
            Value::String(text) => Some(text.clone()),
            _ => {
                self.errors
                    .add(field, format!("The {field} field must be a string."));
                None
            }
        }
    }

    /// Returns the non-null value of `field`, recording a required error
    /// when it is needed but absent.
    fn present(&mut self, field: &'static str, required: bool) -> Option<&'a Value> {
        match self.map.get(field) {
            Some(Value::Null) => {
                self.errors.add(field, required_message(field));
                None
            }
            Some(value) => Some(value),
            None => {
                if required {
                    self.errors.add(field, required_message(field));
                }
                None
            }
        }
    }
}

fn required_message(field: &str) -> String {
    format!("The {field} field is required.")
}
