//! Row materializer: result columns back to display text.

use chrono::DateTime;

use crate::error::ResolveResult;
use crate::model::resolve::dereference_chain;
use crate::model::{Entity, Field, FieldType, ModelRegistry};

/// One column of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            CellValue::Null => 0,
            CellValue::Integer(i) => *i,
            CellValue::Real(r) => *r as i64,
            CellValue::Text(t) => t.trim().parse().unwrap_or(0),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            CellValue::Null => 0.0,
            CellValue::Integer(i) => *i as f64,
            CellValue::Real(r) => *r,
            CellValue::Text(t) => t.trim().parse().unwrap_or(0.0),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Real(r) => r.to_string(),
            CellValue::Text(t) => t.clone(),
        }
    }
}

/// Where the columns of one field sit in a result row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot<'m> {
    pub field: &'m Field,
    /// Raw foreign key of a Reference field (object rows only).
    pub key: Option<usize>,
    /// `_archived` flag of the referenced row (object rows only).
    pub archived: Option<usize>,
    pub display: usize,
}

/// Column positions of an object query row. Index 0 holds the row id.
pub fn object_slots(entity: &Entity) -> Vec<Slot<'_>> {
    let mut index = 1;
    let mut slots = Vec::with_capacity(entity.fields.len());
    for field in entity.fields.values() {
        if field.is_reference() {
            slots.push(Slot {
                field,
                key: Some(index),
                archived: Some(index + 1),
                display: index + 2,
            });
            index += 3;
        } else {
            slots.push(Slot {
                field,
                key: None,
                archived: None,
                display: index,
            });
            index += 1;
        }
    }
    slots
}

/// Column positions of a list query row. Index 0 holds the row id.
pub fn list_slots(entity: &Entity) -> Vec<Slot<'_>> {
    entity
        .fields
        .values()
        .filter(|f| f.listed && !f.is_computed())
        .enumerate()
        .map(|(i, field)| Slot {
            field,
            key: None,
            archived: None,
            display: i + 1,
        })
        .collect()
}

/// Display text of `entity.field` read from column `index` of `row`.
///
/// Reference fields are formatted as their terminal field, whose value the
/// queries place in the display column.
pub fn value_to_string(
    registry: &ModelRegistry,
    entity: &Entity,
    field: &Field,
    row: &[CellValue],
    index: usize,
) -> ResolveResult<String> {
    let cell = row.get(index).unwrap_or(&CellValue::Null);
    if field.is_reference() {
        let (_, terminal) = dereference_chain(registry, entity, field)?;
        return Ok(format_cell(terminal, cell));
    }
    Ok(format_cell(field, cell))
}

/// Format one cell according to a non-Reference field's type.
pub fn format_cell(field: &Field, cell: &CellValue) -> String {
    match field.field_type {
        FieldType::Text => cell.as_text(),
        FieldType::Boolean => {
            if cell.as_i64() != 0 {
                "X".to_string()
            } else {
                " ".to_string()
            }
        }
        FieldType::Integer => cell.as_i64().to_string(),
        FieldType::Date => format_date(cell.as_i64()),
        FieldType::Real => format!("{:.2}", cell.as_f64()),
        FieldType::Computed => match &field.format {
            Some(spec) => format_number(spec, cell.as_f64()),
            None => format!("{:.2}", cell.as_f64()),
        },
        // Unreachable after dereferencing; the raw key is the best we have.
        FieldType::Reference => cell.as_i64().to_string(),
    }
}

/// `YYYY-MM-DD` of a UTC epoch-seconds timestamp.
pub fn format_date(epoch_seconds: i64) -> String {
    DateTime::from_timestamp(epoch_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Apply a printf-style number format such as `"%.1f"` or `"%5.0f %%"`.
///
/// Supports the `f`, `d` and `i` conversions with optional `-`/`0` flags,
/// width and precision. Anything else is copied through unchanged.
pub fn format_number(spec: &str, value: f64) -> String {
    let mut out = String::new();
    let mut chars = spec.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left = false;
        let mut zero = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left = true,
                '0' => zero = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = width * 10 + d as usize;
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0usize;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            precision = Some(p);
        }
        // Length modifiers carry no meaning here.
        while matches!(chars.peek(), Some('l') | Some('h')) {
            chars.next();
        }

        let body = match chars.next() {
            Some('f') | Some('F') => format!("{:.*}", precision.unwrap_or(6), value),
            Some('d') | Some('i') => format!("{}", value.round() as i64),
            Some(other) => {
                out.push('%');
                out.push(other);
                continue;
            }
            None => {
                out.push('%');
                break;
            }
        };
        out.push_str(&pad(&body, width, left, zero));
    }
    out
}

fn pad(body: &str, width: usize, left: bool, zero: bool) -> String {
    let len = body.chars().count();
    if len >= width {
        return body.to_string();
    }
    let fill = width - len;
    if left {
        format!("{body}{}", " ".repeat(fill))
    } else if zero {
        match body.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
            None => format!("{}{body}", "0".repeat(fill)),
        }
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}
