//! Grocery list assembly and the outbound message formatter.
//!
//! A grocery list is never persisted. It is built from a recipe's canonical
//! ingredients, the per-item state the client holds (checked, crossed, note),
//! and any ad hoc items the user added, then rendered into a plain-text and an
//! HTML body for delivery.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::models::CanonicalIngredient;
use crate::normalize::lenient_string;

/// Identity of a grocery item within one list. Ad hoc items are numbered
/// from 1 in the order they were added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", content = "id", rename_all = "snake_case")]
pub enum ItemKey {
    Ingredient(i64),
    Custom(u32),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingredient(id) => write!(f, "{id}"),
            Self::Custom(n) => write!(f, "c{n}"),
        }
    }
}

impl FromStr for ItemKey {
    type Err = anyhow::Error;

    /// `"12"` is ingredient 12, `"c2"` the second ad hoc item.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if let Some(n) = s.strip_prefix('c') {
            let n: u32 = n
                .parse()
                .with_context(|| format!("Invalid custom item key '{s}'"))?;
            if n == 0 {
                bail!("Custom item keys start at c1");
            }
            return Ok(Self::Custom(n));
        }
        let id: i64 = s
            .parse()
            .with_context(|| format!("Invalid item key '{s}'. Use an ingredient id or c<n>"))?;
        Ok(Self::Ingredient(id))
    }
}

/// Client-held interaction state for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    /// Already have it.
    #[serde(default)]
    pub checked: bool,
    /// Don't want it.
    #[serde(default)]
    pub crossed: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
}

/// An item the user added outside of the recipe's ingredient list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdHocItem {
    pub ingredient: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroceryItem {
    pub key: ItemKey,
    pub ingredient: String,
    pub quantity: String,
    pub unit: String,
    pub note: String,
    pub checked: bool,
    pub crossed: bool,
    pub is_custom: bool,
}

impl GroceryItem {
    #[must_use]
    pub fn is_needed(&self) -> bool {
        !self.checked && !self.crossed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroceryList {
    /// Items neither checked nor crossed, in list order.
    pub needed: Vec<GroceryItem>,
    pub all: Vec<GroceryItem>,
}

/// Merge base ingredients, session state, and ad hoc items into one list.
///
/// Ordering is base ingredients in stored order, then ad hoc items in the
/// order added. An ad hoc item's own note is used unless the session holds a
/// non-empty one for it.
#[must_use]
pub fn build_list(
    base: &[CanonicalIngredient],
    session: &HashMap<ItemKey, ItemState>,
    ad_hoc: &[AdHocItem],
) -> GroceryList {
    let mut all = Vec::with_capacity(base.len() + ad_hoc.len());

    for ing in base {
        let key = ItemKey::Ingredient(ing.id);
        let state = session.get(&key).cloned().unwrap_or_default();
        all.push(GroceryItem {
            key,
            ingredient: ing.ingredient.clone(),
            quantity: ing.quantity.clone(),
            unit: ing.unit.clone(),
            note: state.note.trim().to_string(),
            checked: state.checked,
            crossed: state.crossed,
            is_custom: ing.is_custom,
        });
    }

    for (item, n) in ad_hoc.iter().zip(1u32..) {
        let key = ItemKey::Custom(n);
        let state = session.get(&key).cloned().unwrap_or_default();
        let note = if state.note.trim().is_empty() {
            item.note.trim()
        } else {
            state.note.trim()
        };
        all.push(GroceryItem {
            key,
            ingredient: item.ingredient.trim().to_string(),
            quantity: item.quantity.trim().to_string(),
            unit: item.unit.trim().to_string(),
            note: note.to_string(),
            checked: state.checked,
            crossed: state.crossed,
            is_custom: true,
        });
    }

    let needed = all.iter().filter(|i| i.is_needed()).cloned().collect();
    GroceryList { needed, all }
}

/// One line of an outbound grocery message, as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLine {
    pub ingredient: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub quantity: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: String,
    #[serde(default, alias = "isCustom")]
    pub is_custom: bool,
}

impl From<&GroceryItem> for ListLine {
    fn from(item: &GroceryItem) -> Self {
        Self {
            ingredient: item.ingredient.clone(),
            quantity: item.quantity.clone(),
            unit: item.unit.clone(),
            note: item.note.clone(),
            is_custom: item.is_custom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// `<quantity> <unit> <name> [custom] (note)`, skipping empty parts.
#[must_use]
pub fn format_line(line: &ListLine) -> String {
    compose_line(line, |s| s.to_string())
}

/// Same shape as [`format_line`] with every free-text field HTML-escaped.
#[must_use]
pub fn format_line_html(line: &ListLine) -> String {
    compose_line(line, html_escape)
}

fn compose_line(line: &ListLine, render: impl Fn(&str) -> String) -> String {
    let mut parts: Vec<String> = [&line.quantity, &line.unit, &line.ingredient]
        .into_iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(&render)
        .collect();
    if line.is_custom {
        parts.push("[custom]".to_string());
    }
    let note = line.note.trim();
    if !note.is_empty() {
        parts.push(format!("({})", render(note)));
    }
    parts.join(" ")
}

/// Build the email/SMS bodies for a list of needed items.
///
/// Returns `None` when there is nothing to send; callers must not invoke
/// delivery in that case.
#[must_use]
pub fn compose_message(title: Option<&str>, lines: &[ListLine]) -> Option<OutboundMessage> {
    let lines: Vec<&ListLine> = lines
        .iter()
        .filter(|l| !l.ingredient.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }

    let title = title.map(str::trim).filter(|t| !t.is_empty());
    let heading = match title {
        Some(t) => format!("Grocery list: {t}"),
        None => "Your grocery list".to_string(),
    };

    let mut text = format!("{heading}\n\n");
    for line in &lines {
        text.push_str("- ");
        text.push_str(&format_line(line));
        text.push('\n');
    }

    let mut html = format!("<h2>{}</h2>\n<ul>\n", html_escape(&heading));
    for line in &lines {
        html.push_str("<li>");
        html.push_str(&format_line_html(line));
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n");

    Some(OutboundMessage {
        subject: heading,
        text,
        html,
    })
}

#[must_use]
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
