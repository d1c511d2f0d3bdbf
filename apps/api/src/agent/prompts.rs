// All LLM prompt constants for the optimization agent.
// Extraction and analysis use llm_client::prompts::JSON_ONLY_SYSTEM as their
// system prompt. Placeholders in `{braces}` are filled with `str::replace`.

/// Replace `{job_description}` before sending.
pub const REQUIREMENTS_PROMPT_TEMPLATE: &str = r#"Extract structured requirements from this job description:

{job_description}

Return a JSON object with this EXACT schema:
{
  "required_skills": ["must-have skills"],
  "preferred_skills": ["nice-to-have skills"],
  "experience_years": <minimum years as a number, or null>,
  "key_keywords": ["terms an applicant tracking system would screen for"]
}

Use short canonical terms ("PostgreSQL", not "experience with PostgreSQL databases")."#;

/// Replace `{resume}` and `{requirements_json}` before sending.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze this résumé against the job requirements.

Résumé:
{resume}

Job requirements:
{requirements_json}

Return a JSON object with this EXACT schema:
{
  "strengths": ["résumé strengths that match the job"],
  "weaknesses": ["areas where the résumé falls short"],
  "missing_keywords": ["requirement keywords absent from the résumé"],
  "suggestions": ["specific improvements to make"]
}"#;

/// System prompt for improvement planning.
pub const PLANNING_SYSTEM: &str = "You are an expert ATS optimization strategist. \
    You decide WHAT should change in a résumé; you never rewrite it yourself. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Replace `{requirements_json}`, `{analysis_json}`, `{current_score}`,
/// `{previous_plan_json}` and `{truthfulness_instruction}` before sending.
pub const PLANNING_PROMPT_TEMPLATE: &str = r#"Create a résumé improvement plan.

Job requirements:
{requirements_json}

Résumé analysis:
{analysis_json}

Current ATS score: {current_score} / 100

Plan from the previous iteration (null on the first iteration):
{previous_plan_json}

Return a JSON object with this EXACT schema:
{
  "priority_changes": ["specific, high-impact change (max 5)"],
  "skill_additions": ["skills to add or emphasize"],
  "keyword_insertions": ["exact ATS keywords to include"],
  "section_improvements": ["sections that need work, e.g. Experience, Skills, Summary"],
  "expected_score_gain": <number>,
  "reasoning": "why these changes raise the score"
}

Rules:
- Be specific and realistic
- Do not repeat changes the previous plan already made
{truthfulness_instruction}"#;

/// System prompt for the rewrite step. Plain text output, not JSON.
pub const MODIFICATION_SYSTEM: &str = "You are an expert résumé writer. \
    Return ONLY the improved résumé text. \
    Do NOT return JSON. Do NOT add explanations, headings about your changes, or code fences.";

/// Replace `{resume}`, `{plan_json}` and `{truthfulness_instruction}` before sending.
pub const MODIFICATION_PROMPT_TEMPLATE: &str = r#"Apply the improvement plan to the résumé.

- Preserve the résumé's structure and sections
- Do not remove existing valid content
- Improve clarity, keywords and phrasing only
- Keep formatting clean: section headings, bullet points, blank lines between sections
{truthfulness_instruction}

Résumé:
---
{resume}
---

Improvement plan:
---
{plan_json}
---"#;
