pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_tenants.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_tenants.sql")),
				"tables/002_source_records.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_source_records.sql")),
				"tables/003_record_vectors.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_record_vectors.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
