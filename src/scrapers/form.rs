//! HTML form capture and ASP.NET post-back handling.
//!
//! The portal drives pagination and view changes by re-submitting its single
//! page form with `__EVENTTARGET`/`__EVENTARGUMENT` set, so a "link" is a
//! form snapshot plus a target/argument pair.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::http_client::PageRequest;
use super::page::{element_text, Page};

pub const FIELD_EVENT_TARGET: &str = "__EVENTTARGET";
pub const FIELD_EVENT_ARGUMENT: &str = "__EVENTARGUMENT";

static POSTBACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__doPostBack\('([^']*)','([^']*)'\)").unwrap());
static INPUT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input").unwrap());
static TEXTAREA_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("textarea").unwrap());
static SELECT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("select").unwrap());
static OPTION_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("option").unwrap());

/// Errors capturing a form.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Form {0:?} not found")]
    NotFound(String),
    #[error("Form action {0:?} is not a valid URL")]
    InvalidAction(String),
    #[error("Form control {0:?} not found")]
    ControlNotFound(String),
}

/// Snapshot of a form's successful controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub id: String,
    pub method: String,
    pub action: String,
    /// Field order follows the document.
    pub fields: Vec<(String, String)>,
    /// Image buttons as (element id, control name).
    image_buttons: Vec<(String, String)>,
}

impl Form {
    /// Capture the form with the given `id` (or `name`) from a page.
    pub fn from_page(page: &Page, form_id: &str) -> Result<Self, FormError> {
        let selector = Selector::parse(&format!(r#"form[id="{0}"], form[name="{0}"]"#, form_id))
            .map_err(|_| FormError::NotFound(form_id.to_string()))?;
        let form = page
            .select(&selector)
            .next()
            .ok_or_else(|| FormError::NotFound(form_id.to_string()))?;

        let method = form
            .value()
            .attr("method")
            .unwrap_or("POST")
            .to_uppercase();
        let action = match form.value().attr("action") {
            Some(action) if !action.is_empty() => page
                .resolve(action)
                .ok_or_else(|| FormError::InvalidAction(action.to_string()))?
                .to_string(),
            _ => page.url().to_string(),
        };

        let mut fields = Vec::new();
        let mut image_buttons = Vec::new();
        for input in form.select(&INPUT_SELECTOR) {
            collect_input(input, &mut fields, &mut image_buttons);
        }
        for textarea in form.select(&TEXTAREA_SELECTOR) {
            if let Some(name) = textarea.value().attr("name") {
                fields.push((name.to_string(), textarea.text().collect()));
            }
        }
        for select in form.select(&SELECT_SELECTOR) {
            if let Some(name) = select.value().attr("name") {
                if let Some(value) = selected_option(select) {
                    fields.push((name.to_string(), value));
                }
            }
        }

        Ok(Self {
            id: form_id.to_string(),
            method,
            action,
            fields,
            image_buttons,
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a field, replacing any existing value.
    ///
    /// Returns whether an existing field was replaced.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => {
                field.1 = value;
                true
            }
            None => {
                self.fields.push((name.to_string(), value));
                false
            }
        }
    }

    /// Record a click on the image button with element id `id`.
    pub fn click_image(&mut self, id: &str, x: &str, y: &str) -> Result<(), FormError> {
        let name = self
            .image_buttons
            .iter()
            .find(|(button_id, _)| button_id == id)
            .map(|(_, name)| name.clone())
            .ok_or_else(|| FormError::ControlNotFound(id.to_string()))?;
        self.set(&format!("{name}.x"), x);
        self.set(&format!("{name}.y"), y);
        Ok(())
    }

    /// Build the request that submits this form.
    pub fn to_request(&self) -> PageRequest {
        if self.method == "GET" {
            let mut url = self.action.clone();
            if !self.fields.is_empty() {
                let query: Vec<String> = self
                    .fields
                    .iter()
                    .map(|(n, v)| format!("{}={}", urlencoding::encode(n), urlencoding::encode(v)))
                    .collect();
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query.join("&"));
            }
            PageRequest::get(url)
        } else {
            PageRequest::post(self.action.clone(), self.fields.clone())
        }
    }
}

fn collect_input(
    input: ElementRef<'_>,
    fields: &mut Vec<(String, String)>,
    image_buttons: &mut Vec<(String, String)>,
) {
    let el = input.value();
    let Some(name) = el.attr("name") else {
        return;
    };
    let value = el.attr("value").unwrap_or_default();

    match el.attr("type").unwrap_or("text").to_ascii_lowercase().as_str() {
        "image" => {
            let id = el.attr("id").unwrap_or(name);
            image_buttons.push((id.to_string(), name.to_string()));
        }
        "submit" | "reset" | "button" | "file" => {}
        "checkbox" | "radio" => {
            if el.attr("checked").is_some() {
                let value = if value.is_empty() { "on" } else { value };
                fields.push((name.to_string(), value.to_string()));
            }
        }
        _ => fields.push((name.to_string(), value.to_string())),
    }
}

fn selected_option(select: ElementRef<'_>) -> Option<String> {
    let mut first = None;
    for option in select.select(&OPTION_SELECTOR) {
        let value = option
            .value()
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(option));
        if option.value().attr("selected").is_some() {
            return Some(value);
        }
        first.get_or_insert(value);
    }
    first
}

/// A `__doPostBack(target, argument)` call taken from a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostBack {
    pub target: String,
    pub argument: String,
}

impl PostBack {
    /// Parse a `javascript:__doPostBack('T','A')` href.
    ///
    /// Quotes may still be HTML-escaped as `&#39;`.
    pub fn parse(href: &str) -> Option<Self> {
        let href = href.replace("&#39;", "'");
        let caps = POSTBACK_RE.captures(&href)?;
        Some(Self {
            target: caps[1].to_string(),
            argument: caps[2].to_string(),
        })
    }

    /// Set the event fields on a copy of `form`.
    pub fn apply(&self, form: &Form) -> Form {
        let mut form = form.clone();
        form.set(FIELD_EVENT_TARGET, self.target.as_str());
        form.set(FIELD_EVENT_ARGUMENT, self.argument.as_str());
        form
    }
}
