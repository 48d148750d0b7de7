use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

/// The fixed field subset a record's embedding input is built from. Missing
/// fields are skipped; present fields join in this order.
pub const CONTENT_FIELDS: [&str; 6] =
	["name", "description", "location", "type", "status", "amenities"];

const FIELD_SEPARATOR: &str = "\n";

/// Builds the normalized content for one record. Deterministic over the field
/// map; recomputed on every processing pass and never cached.
pub fn build_content(fields: &Value) -> String {
	let mut parts = Vec::new();

	for field in CONTENT_FIELDS {
		let Some(value) = fields.get(field) else {
			continue;
		};

		if let Some(text) = render_field(value)
			&& !text.is_empty()
		{
			parts.push(text);
		}
	}

	parts.join(FIELD_SEPARATOR).nfc().collect()
}

pub fn content_version(content: &str) -> String {
	blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn render_field(value: &Value) -> Option<String> {
	match value {
		Value::String(text) => Some(text.trim().to_string()),
		Value::Number(number) => Some(number.to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		Value::Array(items) => {
			let rendered =
				items.iter().filter_map(render_field).filter(|text| !text.is_empty()).collect::<Vec<_>>();

			if rendered.is_empty() { None } else { Some(rendered.join(", ")) }
		},
		Value::Null | Value::Object(_) => None,
	}
}
