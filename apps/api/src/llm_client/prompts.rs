// Shared prompt fragments used across every LLM-backed step.
// Step-specific templates live next to the step in agent::prompts.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that touches résumé content.
pub const TRUTHFULNESS_INSTRUCTION: &str = "\
    CRITICAL: Never invent experience, employers, dates, degrees, metrics or skills \
    that the original résumé does not support. Rephrasing and reordering are allowed; \
    fabrication is not.";
