//! Table rendering: turn any supported JSON shape into display tables.
//!
//! Different prompts produce different output shapes, and results saved by
//! older prompt versions are still re-opened. Rather than enforce one
//! schema, the renderer classifies the input structurally and maps every
//! shape onto the same `Vec<DisplayTable>`.
//!
//! ## Layouts (first match wins)
//!
//! 1. **Matriz** — `{"Matriz": [...]}`. Elements with `html_tabla` are
//!    pre-rendered tables and pass through verbatim; anything else is a
//!    product record and becomes a two-column `<table>`.
//! 2. **Table list** — a bare array whose first element is an object.
//!    Title and markup are looked up through alias tables.
//! 3. **Single table** — anything else, through the same alias tables.
//!
//! Pre-rendered markup is trusted HTML and is never escaped. Values of
//! product records always are.

use crate::error::RenderError;
use crate::pipeline::extract::MATRIZ_KEY;
use serde::Serialize;
use serde_json::{Map, Value};

/// A render-ready `{title, markup}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayTable {
    pub title: String,
    pub markup: String,
}

impl DisplayTable {
    pub fn new(title: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            markup: markup.into(),
        }
    }

    /// `<section>` with an escaped heading followed by the markup.
    pub fn to_html(&self) -> String {
        format!(
            "<section>\n<h2>{}</h2>\n{}\n</section>\n",
            escape_html(&self.title),
            self.markup
        )
    }
}

/// Concatenate the HTML sections of `tables`.
pub fn render_html(tables: &[DisplayTable]) -> String {
    tables.iter().map(DisplayTable::to_html).collect()
}

// ── Variant-resolution tables ────────────────────────────────────────────────

/// Ordered field aliases with a literal fallback.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub keys: &'static [&'static str],
    pub fallback: &'static str,
}

impl FieldAliases {
    /// Value of the first alias present (and not `null`), as text.
    pub fn find(&self, obj: &Map<String, Value>) -> Option<String> {
        self.keys
            .iter()
            .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
            .map(value_text)
    }

    /// Value of the first alias present, or the fallback.
    pub fn resolve(&self, value: &Value) -> String {
        value
            .as_object()
            .and_then(|obj| self.find(obj))
            .unwrap_or_else(|| self.fallback.to_string())
    }
}

pub const TITLE_ALIASES: FieldAliases = FieldAliases {
    keys: &["titulo_tabla", "titulo"],
    fallback: "Título no encontrado",
};

pub const MARKUP_ALIASES: FieldAliases = FieldAliases {
    keys: &["html_tabla", "tabla_html", "tabla", "html"],
    fallback: "<p>No se encontró contenido HTML de tabla.</p>",
};

const MARKUP_FIELD: &str = "html_tabla";
const MARKUP_TITLE_FIELD: &str = "titulo_tabla";
const PRODUCT_TITLE_FIELD: &str = "nombre_del_producto";

// ── Classification ───────────────────────────────────────────────────────────

/// Structural shape of a visualiser input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layout<'a> {
    Matriz(&'a [Value]),
    TableList(&'a [Value]),
    Single(&'a Value),
}

/// Classify `value` into one of the supported layouts.
pub fn classify(value: &Value) -> Layout<'_> {
    if let Some(Value::Array(items)) = value.get(MATRIZ_KEY) {
        return Layout::Matriz(items);
    }
    if let Value::Array(items) = value {
        if items.first().is_some_and(Value::is_object) {
            return Layout::TableList(items);
        }
    }
    Layout::Single(value)
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// Render any JSON value into display tables.
pub fn render(value: &Value) -> Vec<DisplayTable> {
    match classify(value) {
        Layout::Matriz(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| render_matriz_element(i, item))
            .collect(),
        Layout::TableList(items) => items.iter().map(render_aliased).collect(),
        Layout::Single(v) => vec![render_aliased(v)],
    }
}

/// Parse `text` and render it.
///
/// Invalid JSON yields [`RenderError::InvalidInput`] and no tables.
pub fn render_str(text: &str) -> Result<Vec<DisplayTable>, RenderError> {
    let value: Value = serde_json::from_str(text).map_err(|e| RenderError::InvalidInput {
        detail: e.to_string(),
    })?;
    Ok(render(&value))
}

fn render_aliased(value: &Value) -> DisplayTable {
    DisplayTable::new(TITLE_ALIASES.resolve(value), MARKUP_ALIASES.resolve(value))
}

fn render_matriz_element(index: usize, item: &Value) -> DisplayTable {
    let obj = match item.as_object() {
        Some(obj) => obj,
        None => {
            // Scalars and nested arrays get a one-row table of their own.
            return DisplayTable::new(
                format!("Producto {}", index + 1),
                record_table([("valor", item)]),
            );
        }
    };

    if let Some(markup) = obj.get(MARKUP_FIELD).filter(|v| !v.is_null()) {
        let title = obj
            .get(MARKUP_TITLE_FIELD)
            .filter(|v| !v.is_null())
            .map(value_text)
            .unwrap_or_else(|| format!("Tabla {}", index + 1));
        return DisplayTable::new(title, value_text(markup));
    }

    let title = obj
        .get(PRODUCT_TITLE_FIELD)
        .filter(|v| !v.is_null())
        .map(value_text)
        .unwrap_or_else(|| format!("Producto {}", index + 1));
    DisplayTable::new(title, record_table(obj.iter().map(|(k, v)| (k.as_str(), v))))
}

/// Two-column table, one row per field.
fn record_table<'a>(fields: impl IntoIterator<Item = (&'a str, &'a Value)>) -> String {
    let mut html = String::from("<table>");
    for (field, value) in fields {
        html.push_str("<tr><th>");
        html.push_str(&escape_html(&humanize(field)));
        html.push_str("</th><td>");
        html.push_str(&nl2br(&escape_html(&value_text(value))));
        html.push_str("</td></tr>");
    }
    html.push_str("</table>");
    html
}

// ── Text helpers ─────────────────────────────────────────────────────────────

/// Text of a JSON value: strings as-is, `null` empty, the rest as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `nombre_del_producto` → `Nombre del producto`.
pub fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Insert `<br />` before every line break, keeping the break itself.
pub fn nl2br(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                out.push_str("<br />\r");
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    out.push('\n');
                }
            }
            '\n' => out.push_str("<br />\n"),
            _ => out.push(c),
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prerendered_table_passes_through() {
        let tables = render(&json!({"Matriz": [{"titulo_tabla": "T1", "html_tabla": "<table></table>"}]}));
        assert_eq!(tables, vec![DisplayTable::new("T1", "<table></table>")]);
    }

    #[test]
    fn test_prerendered_table_default_title() {
        let tables = render(&json!({"Matriz": [
            {"nombre_del_producto": "A"},
            {"html_tabla": "<table><tr><td>x</td></tr></table>"}
        ]}));
        assert_eq!(tables[1].title, "Tabla 2");
        assert_eq!(tables[1].markup, "<table><tr><td>x</td></tr></table>");
    }

    #[test]
    fn test_null_markup_falls_back_to_product_record() {
        let tables = render(&json!({"Matriz": [{"nombre_del_producto": "X", "html_tabla": null}]}));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].title, "X");
        assert!(tables[0].markup.contains("<th>Nombre del producto</th><td>X</td>"));
    }

    #[test]
    fn test_product_record_synthesised() {
        let tables = render(&json!({"Matriz": [{"nombre_del_producto": "X", "codigo": "C1"}]}));
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.title, "X");
        assert_eq!(t.markup.matches("<tr>").count(), 2);
        assert!(t.markup.contains("<th>Nombre del producto</th><td>X</td>"));
        assert!(t.markup.contains("<th>Codigo</th><td>C1</td>"));
        assert!(
            t.markup.find("Nombre del producto").unwrap() < t.markup.find("Codigo").unwrap(),
            "rows keep field order"
        );
    }

    #[test]
    fn test_product_record_default_title() {
        let tables = render(&json!({"Matriz": [{"codigo": "C1"}, {"codigo": "C2"}]}));
        assert_eq!(tables[0].title, "Producto 1");
        assert_eq!(tables[1].title, "Producto 2");
    }

    #[test]
    fn test_product_values_escaped_with_breaks() {
        let tables = render(&json!({"Matriz": [{"notas": "<b>a</b> & \"b\"\nlinea 2"}]}));
        assert!(tables[0]
            .markup
            .contains("&lt;b&gt;a&lt;/b&gt; &amp; &quot;b&quot;<br />\nlinea 2"));
    }

    #[test]
    fn test_non_string_values_rendered_as_text() {
        let tables = render(&json!({"Matriz": [{"precio": 12.5, "activo": true, "stock": null}]}));
        let m = &tables[0].markup;
        assert!(m.contains("<th>Precio</th><td>12.5</td>"));
        assert!(m.contains("<th>Activo</th><td>true</td>"));
        assert!(m.contains("<th>Stock</th><td></td>"));
    }

    #[test]
    fn test_scalar_matriz_element() {
        let tables = render(&json!({"Matriz": ["solo texto"]}));
        assert_eq!(tables[0].title, "Producto 1");
        assert!(tables[0].markup.contains("<th>Valor</th><td>solo texto</td>"));
    }

    #[test]
    fn test_empty_matriz_renders_nothing() {
        assert!(render(&json!({"Matriz": []})).is_empty());
    }

    #[test]
    fn test_bare_array_alias_chain() {
        let tables = render(&json!([{"titulo": "A", "tabla": "<p>x</p>"}]));
        assert_eq!(tables, vec![DisplayTable::new("A", "<p>x</p>")]);
    }

    #[test]
    fn test_alias_priority() {
        let tables = render(&json!([{
            "titulo": "low", "titulo_tabla": "high",
            "html": "<i>low</i>", "tabla_html": "<i>high</i>"
        }]));
        assert_eq!(tables[0], DisplayTable::new("high", "<i>high</i>"));
    }

    #[test]
    fn test_bare_array_defaults() {
        let tables = render(&json!([{"otra": 1}, "no es objeto"]));
        assert_eq!(tables.len(), 2);
        for t in &tables {
            assert_eq!(t.title, TITLE_ALIASES.fallback);
            assert_eq!(t.markup, MARKUP_ALIASES.fallback);
        }
    }

    #[test]
    fn test_single_object() {
        let tables = render(&json!({"titulo_tabla": "Única", "html": "<table/>"}));
        assert_eq!(tables, vec![DisplayTable::new("Única", "<table/>")]);
    }

    #[test]
    fn test_matriz_object_is_single_layout() {
        let v = json!({"Matriz": {"html_tabla": "x"}});
        assert!(matches!(classify(&v), Layout::Single(_)));
        let tables = render(&v);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].title, TITLE_ALIASES.fallback);
    }

    #[test]
    fn test_array_of_scalars_is_single_layout() {
        let v = json!([1, 2]);
        assert!(matches!(classify(&v), Layout::Single(_)));
        assert_eq!(render(&v).len(), 1);
    }

    #[test]
    fn test_render_str_invalid_input() {
        let err = render_str("{not json").unwrap_err();
        assert!(matches!(err, RenderError::InvalidInput { .. }));
    }

    #[test]
    fn test_render_str_valid() {
        let tables = render_str(r#"{"Matriz":[{"titulo_tabla":"T1","html_tabla":"<table></table>"}]}"#).unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("nombre_del_producto"), "Nombre del producto");
        assert_eq!(humanize("codigo"), "Codigo");
        assert_eq!(humanize("ñandú_azul"), "Ñandú azul");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn test_nl2br() {
        assert_eq!(nl2br("a\nb"), "a<br />\nb");
        assert_eq!(nl2br("a\r\nb"), "a<br />\r\nb");
        assert_eq!(nl2br("a\rb"), "a<br />\rb");
    }

    #[test]
    fn test_to_html_escapes_title_only() {
        let html = DisplayTable::new("A & B", "<table></table>").to_html();
        assert!(html.contains("<h2>A &amp; B</h2>"));
        assert!(html.contains("<table></table>"));
    }

    #[test]
    fn test_render_html_joins_sections() {
        let html = render_html(&[DisplayTable::new("a", "x"), DisplayTable::new("b", "y")]);
        assert_eq!(html.matches("<section>").count(), 2);
    }
}
