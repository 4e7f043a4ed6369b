use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{GradebookError, Result};
use crate::grading::FieldError;
use crate::ipc::types::Request;

fn non_blank(v: Option<&Value>) -> Option<&str> {
    v.and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str> {
    non_blank(req.params.get(key))
        .ok_or_else(|| GradebookError::bad_params(format!("missing {}", key)))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    non_blank(req.params.get(key))
}

/// Form fields arrive as numbers or numeric strings; blank means unset.
fn parse_int(v: &Value) -> std::result::Result<Option<i64>, ()> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_i64().map(Some).ok_or(()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| ()),
        _ => Err(()),
    }
}

fn parse_float(v: &Value) -> std::result::Result<Option<f64>, ()> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or(()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| ()),
        _ => Err(()),
    }
}

/// Field-error collector over one JSON object of form values.
pub struct FormReader<'a> {
    obj: Option<&'a serde_json::Map<String, Value>>,
    pub errors: Vec<FieldError>,
}

impl<'a> FormReader<'a> {
    pub fn new(v: Option<&'a Value>) -> Self {
        Self {
            obj: v.and_then(|v| v.as_object()),
            errors: Vec::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.obj.and_then(|o| o.get(key))
    }

    pub fn int(&mut self, key: &str, field: &str) -> Option<i64> {
        self.int_patch(key, field).flatten()
    }

    pub fn float(&mut self, key: &str, field: &str) -> Option<f64> {
        self.float_patch(key, field).flatten()
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Required text; a blank value is recorded as a field error.
    pub fn required_text(&mut self, key: &str, field: &str) -> String {
        match self.text(key) {
            Some(s) => s,
            None => {
                self.errors.push(FieldError::new(field, "required"));
                String::new()
            }
        }
    }

    /// `None` when the key is absent, `Some(None)` when it is null or blank.
    pub fn int_patch(&mut self, key: &str, field: &str) -> Option<Option<i64>> {
        let v = self.get(key)?;
        match parse_int(v) {
            Ok(n) => Some(n),
            Err(()) => {
                self.errors.push(FieldError::new(field, "must be an integer"));
                None
            }
        }
    }

    pub fn float_patch(&mut self, key: &str, field: &str) -> Option<Option<f64>> {
        let v = self.get(key)?;
        match parse_float(v) {
            Ok(n) => Some(n),
            Err(()) => {
                self.errors.push(FieldError::new(field, "must be a number"));
                None
            }
        }
    }

    pub fn text_patch(&mut self, key: &str, field: &str) -> Option<Option<String>> {
        let v = self.get(key)?;
        match v {
            Value::Null => Some(None),
            Value::String(s) => {
                let t = s.trim();
                Some((!t.is_empty()).then(|| t.to_string()))
            }
            _ => {
                self.errors.push(FieldError::new(field, "must be a string"));
                None
            }
        }
    }

    /// Dates are `YYYY-MM-DD`.
    pub fn date_patch(&mut self, key: &str, field: &str) -> Option<Option<NaiveDate>> {
        let raw = self.text_patch(key, field)?;
        match raw {
            None => Some(None),
            Some(s) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => Some(Some(d)),
                Err(_) => {
                    self.errors
                        .push(FieldError::new(field, "must be a date (YYYY-MM-DD)"));
                    None
                }
            },
        }
    }
}
