//! Prompt catalog: instructions sent to the model, keyed by prompt id.
//!
//! The catalog is configuration, not logic. Each entry carries the
//! instruction text for the Responses call, the display metadata the UI
//! shows while the user confirms a run, the route of the visualiser that
//! understands the entry's output, and a declarative schema of the extra
//! parameters the confirmation form collects.
//!
//! Entries keep the order of the catalog file; the first entry is the
//! default prompt. A catalog file looks like:
//!
//! ```json
//! {
//!   "prompts": {
//!     "ficha_tecnica": {
//!       "name": "Ficha técnica",
//!       "description": "Extrae los productos de una ficha técnica",
//!       "prompt_text": "Devuelve un objeto JSON con la clave Matriz…",
//!       "visualizer": "/visualize",
//!       "parameters": {
//!         "parametro_2": { "label": "Modelo", "type": "select",
//!                          "options": ["gpt-5.1"], "default": "gpt-5.1" }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::error::Pdf2MatrizError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// User-turn text sent next to the attached PDF.
pub const DEFAULT_USER_INSTRUCTION: &str = "Analiza el archivo PDF adjunto siguiendo exactamente las instrucciones anteriores y devuelve un único objeto JSON con la clave Matriz.";

/// Instruction text used when a requested prompt key is not in the catalog.
pub const FALLBACK_PROMPT_TEXT: &str = "Analiza este documento.";

/// Route of the table visualiser used when an entry names none.
pub const DEFAULT_VISUALIZER: &str = "/visualize";

/// Key of the built-in prompt.
pub const DEFAULT_PROMPT_KEY: &str = "ficha_tecnica";

/// Form parameter that carries the requested model.
pub const MODEL_PARAMETER: &str = "parametro_2";

/// Instructions of the built-in prompt.
pub const DEFAULT_PROMPT_TEXT: &str = r#"Eres un asistente experto en la lectura de fichas técnicas de productos.

Lee el documento PDF adjunto completo y extrae la información de cada producto que aparezca.

Reglas:

1. FORMATO DE SALIDA
   - Devuelve UN ÚNICO objeto JSON con una sola clave de primer nivel: "Matriz"
   - "Matriz" es un array con un elemento por producto o por tabla del documento
   - No añadas texto antes ni después del JSON

2. PRODUCTOS
   - Cada producto es un objeto con campos en snake_case
     (por ejemplo "nombre_del_producto", "codigo", "descripcion")
   - Los valores son cadenas de texto; respeta los saltos de línea del documento

3. TABLAS
   - Si el documento contiene una tabla que no encaja como producto, añade un
     elemento con "titulo_tabla" y "html_tabla" (HTML de la tabla, sin estilos)

4. FIDELIDAD
   - No inventes datos; si un campo no aparece en el documento, omítelo"#;

/// How a parameter is collected by the confirmation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// Free text input. (default)
    #[default]
    Text,
    /// Pick one of `options`.
    Select,
}

/// One declarative parameter of a prompt entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptParameter {
    /// Form field name. Filled from the map key while loading.
    #[serde(default)]
    pub key: String,
    /// Label shown to the user; the key is shown when absent.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: ParameterKind,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

impl PromptParameter {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptEntry {
    pub key: String,
    pub name: Option<String>,
    pub description: String,
    pub prompt_text: Option<String>,
    pub visualizer: Option<String>,
    pub parameters: Vec<PromptParameter>,
}

#[derive(Deserialize)]
struct RawPromptEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    prompt_text: Option<String>,
    #[serde(default)]
    visualizer: Option<String>,
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// A prompt after key resolution, ready for one processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPrompt {
    pub key: String,
    pub name: String,
    pub text: String,
    pub visualizer: String,
}

/// Ordered, read-only map from prompt key to [`PromptEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PromptCatalog {
    entries: Vec<PromptEntry>,
}

impl PromptCatalog {
    /// The catalog compiled into the binary: one technical-sheet prompt.
    pub fn builtin() -> Self {
        Self {
            entries: vec![PromptEntry {
                key: DEFAULT_PROMPT_KEY.to_string(),
                name: Some("Ficha técnica".to_string()),
                description: "Extrae los productos y tablas de una ficha técnica en PDF."
                    .to_string(),
                prompt_text: Some(DEFAULT_PROMPT_TEXT.to_string()),
                visualizer: Some(DEFAULT_VISUALIZER.to_string()),
                parameters: vec![PromptParameter {
                    key: MODEL_PARAMETER.to_string(),
                    label: Some("Modelo".to_string()),
                    kind: ParameterKind::Select,
                    options: vec![crate::config::DEFAULT_MODEL.to_string()],
                    default: Some(crate::config::DEFAULT_MODEL.to_string()),
                }],
            }],
        }
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Pdf2MatrizError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Pdf2MatrizError::CatalogLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|detail| Pdf2MatrizError::CatalogLoad {
            path: path.to_path_buf(),
            detail,
        })
    }

    /// Parse a catalog document.
    ///
    /// Accepts either `{"prompts": {...}}` or the bare entry map.
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        let root: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let mut root = match root {
            Value::Object(map) => map,
            _ => return Err("catalog must be a JSON object".to_string()),
        };
        let prompts = match root.remove("prompts") {
            Some(Value::Object(map)) => map,
            Some(_) => return Err("'prompts' must be an object".to_string()),
            None => root,
        };

        let mut entries = Vec::with_capacity(prompts.len());
        for (key, raw) in prompts {
            let raw: RawPromptEntry =
                serde_json::from_value(raw).map_err(|e| format!("prompt '{key}': {e}"))?;
            let mut parameters = Vec::with_capacity(raw.parameters.len());
            for (param_key, spec) in raw.parameters {
                let mut param: PromptParameter = serde_json::from_value(spec)
                    .map_err(|e| format!("prompt '{key}', parameter '{param_key}': {e}"))?;
                param.key = param_key;
                parameters.push(param);
            }
            entries.push(PromptEntry {
                key,
                name: raw.name,
                description: raw.description,
                prompt_text: raw.prompt_text,
                visualizer: raw.visualizer,
                parameters,
            });
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&PromptEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// The first entry, used when a request names no prompt.
    pub fn first(&self) -> Option<&PromptEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[PromptEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the prompt for one run.
    ///
    /// * no key → the first entry
    /// * unknown key → the key doubles as display name and the run uses
    ///   [`FALLBACK_PROMPT_TEXT`]
    /// * no key and an empty catalog → [`Pdf2MatrizError::PromptNotFound`]
    pub fn resolve(&self, key: Option<&str>) -> Result<ResolvedPrompt, Pdf2MatrizError> {
        let key = match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => k.to_string(),
            None => self
                .first()
                .map(|e| e.key.clone())
                .ok_or_else(|| Pdf2MatrizError::PromptNotFound {
                    key: "<default>".to_string(),
                })?,
        };

        let entry = self.get(&key);
        Ok(ResolvedPrompt {
            name: entry
                .and_then(|e| e.name.clone())
                .unwrap_or_else(|| key.clone()),
            text: entry
                .and_then(|e| e.prompt_text.clone())
                .unwrap_or_else(|| FALLBACK_PROMPT_TEXT.to_string()),
            visualizer: entry
                .and_then(|e| e.visualizer.clone())
                .unwrap_or_else(|| DEFAULT_VISUALIZER.to_string()),
            key,
        })
    }
}
