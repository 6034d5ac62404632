//! Prompt assembly for ideation, code generation, and repair.

use super::Idea;
use crate::config::{INDEX_COLUMNS_DESC, STOCK_COLUMNS_DESC};

pub const IDEATION_SYSTEM_PROMPT: &str = "You are a quantitative researcher designing daily cross-sectional stock factors. You answer with strict JSON and nothing else.";

pub const CODING_SYSTEM_PROMPT: &str = "You are a quantitative developer writing Rhai scripts. You answer with a single complete Rhai function and nothing else.";

pub const REPAIR_SYSTEM_PROMPT: &str = "You are a quantitative developer fixing a broken Rhai script. You answer with a single complete corrected Rhai function and nothing else.";

fn data_dictionary() -> String {
    format!(
        "Daily stock panel columns: {}.\nDaily index panel columns: {}.",
        STOCK_COLUMNS_DESC.join(", "),
        INDEX_COLUMNS_DESC.join(", ")
    )
}

/// Ask for `count` variants of a seed idea as a strict JSON array.
pub fn ideation_prompt(seed: &str, count: usize) -> String {
    format!(
        r#"Design {count} distinct quantitative factor variants inspired by this seed idea:

{seed}

{dictionary}

Reply with ONLY a JSON array (no markdown, no commentary). Each element must be an object with exactly these keys:
- "factor_name": a short CamelCase identifier, unique within your reply
- "factor_formula": the factor expressed as a formula over the columns above
- "factor_description": one or two sentences explaining the economic intuition

Example shape:
[{{"factor_name": "VolumePriceDiverge01", "factor_formula": "...", "factor_description": "..."}}]"#,
        dictionary = data_dictionary(),
    )
}

/// Ask for a Rhai script implementing one idea.
pub fn code_gen_prompt(idea: &Idea) -> String {
    format!(
        r#"Write a Rhai script that computes the factor below over daily stock data.

Factor name: {name}
Formula: {formula}
Description: {description}

{dictionary}

The script must define exactly this function:

fn {name}(panel, index) {{
    // ...
    result
}}

`panel` and `index` are frame values. The frame API:
- panel.rows() returns the row count
- panel.has_column("name") checks for a column
- panel.column("name") returns a column as an array
- panel.select(["a", "b"]) returns a new frame with those columns
- panel.set_column("name", values) adds or replaces a column from an array
- new_frame() creates an empty frame

Requirements:
- Return a frame containing the columns "TradingDay", "SecuCode" and "{name}".
- The "{name}" column holds the factor values as floats, never integers.
- Handle the data as given. Do not print, panic, or call anything outside the API above.

Reply with ONLY the Rhai code for the function, no markdown fences, no explanation."#,
        name = idea.name,
        formula = idea.formula_text(),
        description = idea.description,
        dictionary = data_dictionary(),
    )
}

/// Ask for a corrected script given the previous attempt and its diagnostic.
///
/// The original formula and description ride along so the fix does not
/// drift away from the intended factor.
pub fn repair_prompt(old_code: &str, error: &str, idea: &Idea) -> String {
    format!(
        r#"The Rhai script below failed when executed. Fix it.

Factor name: {name}
Formula: {formula}
Description: {description}

Previous code:
{old_code}

Failure diagnostic:
{error}

The corrected script must still define `fn {name}(panel, index)` and return a frame with the columns "TradingDay", "SecuCode" and "{name}", where "{name}" holds floats. Keep the factor faithful to the formula and description above.

Reply with ONLY the complete corrected Rhai function, no markdown fences, no explanation."#,
        name = idea.name,
        formula = idea.formula_text(),
        description = idea.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea() -> Idea {
        Idea {
            name: "AlphaMomentum01".to_string(),
            formula: Some("close / delay(close, 5) - 1".to_string()),
            description: "Five day price momentum.".to_string(),
        }
    }

    #[test]
    fn ideation_prompt_carries_seed_count_and_columns() {
        let prompt = ideation_prompt("price-volume divergence", 3);
        assert!(prompt.contains("3 distinct"));
        assert!(prompt.contains("price-volume divergence"));
        assert!(prompt.contains("TurnOverVolume"));
        assert!(prompt.contains("factor_name"));
    }

    #[test]
    fn code_gen_prompt_pins_the_function_signature() {
        let prompt = code_gen_prompt(&idea());
        assert!(prompt.contains("fn AlphaMomentum01(panel, index)"));
        assert!(prompt.contains("close / delay(close, 5) - 1"));
        assert!(prompt.contains("\"AlphaMomentum01\""));
    }

    #[test]
    fn code_gen_prompt_marks_missing_formulas() {
        let mut bare = idea();
        bare.formula = None;
        assert!(code_gen_prompt(&bare).contains("(not provided)"));
    }

    #[test]
    fn repair_prompt_includes_code_and_diagnostic() {
        let prompt = repair_prompt(
            "fn AlphaMomentum01(panel, index) { panel }",
            "Missing factor column: AlphaMomentum01",
            &idea(),
        );
        assert!(prompt.contains("fn AlphaMomentum01(panel, index) { panel }"));
        assert!(prompt.contains("Missing factor column"));
        assert!(prompt.contains("Five day price momentum."));
    }
}
