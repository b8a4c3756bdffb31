// Copyright 2026 The Bakery Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `form` interactor: interactive but programmatic, gathering a set of
//! named fields through a pluggable [`Filler`] rather than a browser.

use std::collections::BTreeMap;
use std::io::Write;

use bakery_core::{DischargeToken, Error as ProtocolError};
use bakery_http::HttpClient;
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::InteractError;
use crate::Interactor;

pub const KIND: &str = "form";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldSpec {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub secret: bool,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormSchema {
    pub schema: BTreeMap<String, FieldSpec>,
}

/// A gathered form value, already coerced to its field's declared type.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Bool(bool),
}

/// Gathers values for a [`FormSchema`]. Implementations may prompt a
/// terminal, read a config file, or answer from a fixed map in tests.
pub trait Filler: Send + Sync {
    fn fill(&self, form: &FormSchema) -> Result<BTreeMap<String, FieldValue>, InteractError>;
}

/// Prompts on the terminal, field by field: ordered by group name, then by
/// whether the field is secret (non-secret first within a group), then by
/// description. Reads a default from the first of the field's listed
/// environment variables that is set and non-empty. Reads secrets without
/// echo when stdin is a terminal; otherwise reads a plain line (so piped
/// input / non-interactive test harnesses still work).
pub struct DefaultFiller;

impl DefaultFiller {
    fn ordered_fields(form: &FormSchema) -> Vec<(&String, &FieldSpec)> {
        let mut fields: Vec<_> = form.schema.iter().collect();
        fields.sort_by(|(_, a), (_, b)| {
            a.group.cmp(&b.group).then(a.secret.cmp(&b.secret)).then(a.description.cmp(&b.description))
        });
        fields
    }

    fn env_default(spec: &FieldSpec) -> Option<String> {
        spec.env.iter().find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn read_line(secret: bool) -> std::io::Result<String> {
        if secret && atty::is(atty::Stream::Stdin) {
            rpassword::read_password()
        } else {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line.trim_end_matches(['\n', '\r']).to_owned())
        }
    }

    fn coerce(name: &str, kind: FieldType, raw: &str) -> Result<FieldValue, InteractError> {
        match kind {
            FieldType::String => Ok(FieldValue::String(raw.to_owned())),
            FieldType::Int => raw
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| InteractError::FieldCoercion(name.to_owned(), "int")),
            FieldType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(FieldValue::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(InteractError::FieldCoercion(name.to_owned(), "bool")),
            },
        }
    }
}

impl Filler for DefaultFiller {
    fn fill(&self, form: &FormSchema) -> Result<BTreeMap<String, FieldValue>, InteractError> {
        let mut values = BTreeMap::new();

        for (name, spec) in Self::ordered_fields(form) {
            let default = Self::env_default(spec);

            let mut attempt = 0;
            let value = loop {
                attempt += 1;
                print!("{}", spec.description);
                if let Some(default) = &default {
                    print!(" [{}]", if spec.secret { "****" } else { default });
                }
                print!(": ");
                std::io::stdout().flush()?;

                let raw = Self::read_line(spec.secret)?;
                let raw = if raw.is_empty() { default.clone().unwrap_or_default() } else { raw };

                if raw.is_empty() {
                    return Err(InteractError::FieldRequired(name.clone()));
                }

                match Self::coerce(name, spec.kind, &raw) {
                    Ok(value) => break value,
                    Err(err) if attempt >= 3 => return Err(err),
                    Err(_) => {
                        println!("that doesn't look like a {:?}, try again", spec.kind);
                        continue;
                    }
                }
            };

            values.insert(name.clone(), value);
        }

        Ok(values)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: DischargeToken,
}

/// Interactive but programmatic: fetches a form schema, gathers answers
/// through a [`Filler`], and posts them back for a discharge token.
pub struct FormInteractor {
    filler: Box<dyn Filler>,
}

impl FormInteractor {
    #[must_use]
    pub fn new(filler: Box<dyn Filler>) -> Self {
        Self { filler }
    }
}

impl Default for FormInteractor {
    fn default() -> Self {
        Self::new(Box::new(DefaultFiller))
    }
}

#[async_trait::async_trait]
impl Interactor for FormInteractor {
    fn kind(&self) -> &str {
        KIND
    }

    async fn interact(
        &self,
        http: &HttpClient,
        location: &str,
        error: &ProtocolError,
    ) -> Result<DischargeToken, InteractError> {
        #[derive(Deserialize)]
        struct FormParams {
            #[serde(rename = "URL")]
            url: String,
        }
        let params: FormParams = error
            .info
            .interaction_method(KIND)
            .map_err(|e| InteractError::BadParams(KIND.to_owned(), e))?
            .ok_or_else(|| InteractError::MissingParams(KIND.to_owned()))?;

        let url = resolve(location, &params.url)?;
        let schema: FormSchema = http.get_json(url).await?;

        let values = self.filler.fill(&schema)?;

        #[derive(Serialize)]
        struct Submission<'a> {
            form: &'a BTreeMap<String, FieldValue>,
        }

        let post_url = resolve(location, &params.url)?;
        let resp: TokenResponse = http.post_json(post_url, &Submission { form: &values }).await?;
        Ok(resp.token)
    }
}

fn resolve(location: &str, url: &str) -> Result<Uri, InteractError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.parse().map_err(|_| InteractError::InvalidLocation(url.to_owned()))
    } else {
        let base = location.trim_end_matches('/');
        format!("{base}/{}", url.trim_start_matches('/'))
            .parse()
            .map_err(|_| InteractError::InvalidLocation(url.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FormSchema {
        let mut fields = BTreeMap::new();
        fields.insert(
            "age".to_owned(),
            FieldSpec {
                description: "how old".to_owned(),
                kind: FieldType::Int,
                secret: false,
                group: "a".to_owned(),
                env: vec![],
            },
        );
        FormSchema { schema: fields }
    }

    #[test]
    fn coerce_int_succeeds() {
        let value = DefaultFiller::coerce("age", FieldType::Int, "42").unwrap();
        assert!(matches!(value, FieldValue::Int(42)));
    }

    #[test]
    fn coerce_bool_accepts_yes_no() {
        assert!(matches!(DefaultFiller::coerce("x", FieldType::Bool, "yes").unwrap(), FieldValue::Bool(true)));
        assert!(matches!(DefaultFiller::coerce("x", FieldType::Bool, "no").unwrap(), FieldValue::Bool(false)));
    }

    #[test]
    fn coerce_int_rejects_garbage() {
        assert!(DefaultFiller::coerce("age", FieldType::Int, "not-a-number").is_err());
    }

    #[test]
    fn ordered_fields_groups_then_secrecy_then_description() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "password".to_owned(),
            FieldSpec {
                description: "password".to_owned(),
                kind: FieldType::String,
                secret: true,
                group: "auth".to_owned(),
                env: vec![],
            },
        );
        fields.insert(
            "username".to_owned(),
            FieldSpec {
                description: "username".to_owned(),
                kind: FieldType::String,
                secret: false,
                group: "auth".to_owned(),
                env: vec![],
            },
        );
        let form = FormSchema { schema: fields };
        let ordered = DefaultFiller::ordered_fields(&form);
        assert_eq!(ordered[0].0, "username");
        assert_eq!(ordered[1].0, "password");
    }

    #[test]
    fn resolve_prefers_absolute_url() {
        let uri = resolve("https://idp.example", "https://other.example/form").unwrap();
        assert_eq!(uri.to_string(), "https://other.example/form");
    }

    #[test]
    fn resolve_joins_relative_path() {
        let uri = resolve("https://idp.example/", "/form").unwrap();
        assert_eq!(uri.to_string(), "https://idp.example/form");
    }

    #[test]
    fn schema_parses_from_json() {
        let s = schema();
        assert_eq!(s.schema.len(), 1);
    }
}
