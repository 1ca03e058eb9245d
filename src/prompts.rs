//! Prompt rendering for the agent loop, extraction, and embedding stages.
//!
//! The instruction templates teach the model the exact protocols the
//! response parser recognizes (`TOOL_CALL:`/`ARGS:`/`DONE` in text mode, the
//! `{"tool": ..., "args": ...}` object in table mode), so template text and
//! parser markers must move together. A caller-supplied system prompt
//! bypasses all of this verbatim.

use crate::schema::ColumnSpec;

/// Continuation message sent on every table-mode iteration after the first;
/// the collaborator's context carries the instructions forward.
pub(crate) const CONTINUE_TOKEN: &str = "Continue";

/// Wrap the raw tool-provider catalog with its fixed header.
pub fn catalog_description(raw: &str) -> String {
    format!("Available tools (JSON):\n{raw}")
}

/// Render the target schema for prompts: one line per non-embedding column
/// with its declared type.
pub fn schema_description(columns: &[ColumnSpec]) -> String {
    let mut desc = String::from("Table columns:\n");
    for column in columns.iter().filter(|c| !c.is_embedding_target) {
        desc.push_str(&format!("  - {} ({})\n", column.name, column.decl_type));
    }
    desc
}

/// Text-mode instruction prompt: marker-based tool-call protocol.
pub fn text_instructions(catalog: &str, goal: &str) -> String {
    format!(
        "You are an AI agent that can use tools to accomplish tasks.\n\n\
         {catalog}\n\
         User goal: {goal}\n\n\
         To use a tool, respond with EXACTLY this format:\n\
         TOOL_CALL: tool_name\n\
         ARGS: {{\"param1\": \"value1\", \"param2\": \"value2\"}}\n\n\
         After the tool executes, you'll see the result and can call another tool or provide a final answer.\n\
         Type DONE only when you have completed the task."
    )
}

/// Table-mode instruction prompt: JSON tool-call protocol plus the
/// anti-placeholder rules the parser's rejection path depends on.
pub fn table_instructions(catalog: &str, schema: &str, goal: &str) -> String {
    format!(
        "You are a tool-calling agent. You MUST respond with ONLY a tool call, nothing else.\n\n\
         {catalog}\n\n\
         TARGET DATA SCHEMA:\n\
         You need to collect data that will populate a table with these columns:\n\
         {schema}\n\
         Make sure to search for properties/items that have information matching these columns.\n\n\
         IMPORTANT RULES:\n\
         1. Your response must be ONLY in this EXACT JSON format:\n\
            {{\"tool\": \"tool_name\", \"args\": {{\"param1\": \"value1\", \"param2\": 123}}}}\n\
         2. Do NOT include explanations, reasoning, or any other text\n\
         3. Do NOT use markdown code blocks or backticks\n\
         4. ONLY use the exact parameter names shown in the tool signatures above\n\
         5. Use proper JSON: keys in \"quotes\", boolean as true/false (lowercase), strings in \"quotes\"\n\
         6. You can make MULTIPLE tool calls across iterations to gather detailed data\n\
         7. Type DONE only when you have retrieved sufficient detailed information\n\n\
         CRITICAL: Extract actual values from previous tool responses\n\
         ✓ CORRECT: {{\"args\": {{\"name\": \"sqlite-agent\"}}}}   (literal value from response)\n\
         ✗ WRONG:   {{\"args\": {{\"name\": \"{{{{items[0].name}}}}\"}}}}  (template syntax - will fail!)\n\
         ✗ WRONG:   {{\"args\": {{\"name\": \"<name-from-search>\"}}}} (placeholder - will fail!)\n\
         When you receive tool responses, read the actual values and use them directly.\n\n\
         Task: {goal}\n\n\
         Respond with ONLY the JSON tool call:"
    )
}

/// Extraction prompt: schema (twice — once as context, once as the exact
/// key list), the rules, and the capped conversation excerpt.
pub fn extraction_instructions(schema: &str, history_excerpt: &str) -> String {
    format!(
        "Extract structured data from the following information and format it as a JSON array.\n\n\
         {schema}\n\n\
         IMPORTANT:\n\
         - Return ONLY a JSON array of objects\n\
         - Each object must have these EXACT keys (matching column names):\n\
         {schema}\n\
         - Extract ALL available data that matches the schema\n\
         - Use null for missing values\n\
         - Do NOT include the 'embedding' column if present\n\n\
         CRITICAL ID EXTRACTION RULE:\n\
         If the schema has an 'id' column, look in the JSON data for fields like:\n\
         - \"id\", \"listing_id\", \"property_id\", \"item_id\", etc.\n\
         Extract the ACTUAL numeric/string ID value from the source data.\n\
         Example: if you see {{\"id\": 123456789, \"title\": \"Rome Apartment\"}}, use 123456789\n\
         NEVER use 0, 1, 2, 3 as IDs - use the real IDs from the data!\n\n\
         Data to extract:\n\
         {history_excerpt}\n\n\
         Return ONLY the JSON array:"
    )
}

/// Ask which source columns feed one embedding column. The model answers
/// with a comma-separated list that is validated against the real schema.
pub fn embedding_source_prompt(available_columns: &str, embedding_column: &str) -> String {
    format!(
        "Table has columns: {available_columns}\n\n\
         For the '{embedding_column}' embedding column, which source columns should be embedded together?\n\
         Return ONLY comma-separated column names, no explanation.\n\
         Example: title, description\n\n\
         Relevant columns: "
    )
}

// ─── Tests ──────────────────────────────────────────────────────────────────
