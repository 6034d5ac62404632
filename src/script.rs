//! Rhai execution boundary for generated artifacts.
//!
//! Generated code never touches the host directly: scripts see two `Frame`
//! values and the small column API registered here, and every failure mode
//! comes back as a value (compile errors from `compile`, runtime errors as
//! `EvalAltResult` diagnostics from `call`). Nothing in this module panics
//! on script misbehavior.

use crate::table::{Column, Frame};
use rhai::{AST, Array, Dynamic, Engine, EvalAltResult, Scope};

/// A compiled artifact together with its resolved entry-point function.
#[derive(Debug, Clone)]
pub struct BoundUnit {
    ast: AST,
    entry_point: String,
}

impl BoundUnit {
    pub fn new(ast: AST, entry_point: impl Into<String>) -> Self {
        Self {
            ast,
            entry_point: entry_point.into(),
        }
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Owns the scripting engine and the `Frame` API visible to scripts.
pub struct ScriptHost {
    engine: Engine,
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHost {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.register_type_with_name::<Frame>("Frame");
        engine.register_fn("new_frame", Frame::new);
        engine.register_fn("rows", |frame: &mut Frame| frame.rows() as i64);
        engine.register_fn("has_column", |frame: &mut Frame, name: &str| {
            frame.has_column(name)
        });
        engine.register_fn("columns", |frame: &mut Frame| -> Array {
            frame
                .column_names()
                .into_iter()
                .map(|name| Dynamic::from(name.to_string()))
                .collect()
        });
        engine.register_fn(
            "column",
            |frame: &mut Frame, name: &str| -> Result<Array, Box<EvalAltResult>> {
                let column = frame
                    .column(name)
                    .ok_or_else(|| -> Box<EvalAltResult> {
                        format!("unknown column '{name}'").into()
                    })?;
                Ok(column_to_array(column))
            },
        );
        engine.register_fn(
            "select",
            |frame: &mut Frame, names: Array| -> Result<Frame, Box<EvalAltResult>> {
                let mut owned = Vec::with_capacity(names.len());
                for name in names {
                    let name = name.into_immutable_string().map_err(
                        |typ| -> Box<EvalAltResult> {
                            format!("select expects column names, got {typ}").into()
                        },
                    )?;
                    owned.push(name.to_string());
                }
                let borrowed: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
                frame
                    .select(&borrowed)
                    .map_err(|err| -> Box<EvalAltResult> { err.to_string().into() })
            },
        );
        engine.register_fn(
            "set_column",
            |frame: &mut Frame, name: &str, values: Array| -> Result<(), Box<EvalAltResult>> {
                let column = array_to_column(name, values)?;
                frame
                    .set_column(name, column)
                    .map_err(|err| -> Box<EvalAltResult> { err.to_string().into() })
            },
        );
        Self { engine }
    }

    /// Compile script text. The error is a plain message so callers can hand
    /// it straight back to the collaborator as a diagnostic.
    pub fn compile(&self, text: &str) -> Result<AST, String> {
        self.engine.compile(text).map_err(|err| err.to_string())
    }

    /// Names of functions defined by the script itself, sorted so fallback
    /// entry-point resolution is deterministic.
    pub fn script_functions(&self, ast: &AST) -> Vec<String> {
        let mut names: Vec<String> = ast
            .iter_functions()
            .map(|func| func.name.to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Invoke the bound entry point with its own copies of the input frames.
    pub fn call(
        &self,
        unit: &BoundUnit,
        panel: Frame,
        index: Frame,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let mut scope = Scope::new();
        self.engine
            .call_fn::<Dynamic>(&mut scope, &unit.ast, &unit.entry_point, (panel, index))
    }
}

fn column_to_array(column: &Column) -> Array {
    match column {
        Column::Int(values) => values.iter().map(|v| Dynamic::from(*v)).collect(),
        Column::Float(values) => values.iter().map(|v| Dynamic::from(*v)).collect(),
        Column::Str(values) => values.iter().map(|v| Dynamic::from(v.clone())).collect(),
    }
}

/// Coerce a script array into a typed column: all-int stays int, any float
/// (or `()` standing in for a missing value) promotes to float with NaN
/// holes, strings stay strings. Mixing strings with numbers is an error.
fn array_to_column(name: &str, values: Array) -> Result<Column, Box<EvalAltResult>> {
    let mut has_int = false;
    let mut has_float = false;
    let mut has_str = false;
    let mut has_unit = false;
    for value in &values {
        if value.is_int() {
            has_int = true;
        } else if value.is_float() {
            has_float = true;
        } else if value.is_string() {
            has_str = true;
        } else if value.is_unit() {
            has_unit = true;
        } else {
            return Err(format!(
                "column '{name}' has unsupported value type '{}'",
                value.type_name()
            )
            .into());
        }
    }
    if has_str && (has_int || has_float || has_unit) {
        return Err(format!("column '{name}' mixes strings and numbers").into());
    }

    if has_str {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let text = value
                .into_immutable_string()
                .map_err(|typ| -> Box<EvalAltResult> {
                    format!("column '{name}' expected string, got {typ}").into()
                })?;
            out.push(text.to_string());
        }
        Ok(Column::Str(out))
    } else if has_float || has_unit {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            if value.is_unit() {
                out.push(f64::NAN);
            } else if let Ok(x) = value.as_float() {
                out.push(x);
            } else {
                let x = value.as_int().map_err(|typ| -> Box<EvalAltResult> {
                    format!("column '{name}' expected number, got {typ}").into()
                })?;
                out.push(x as f64);
            }
        }
        Ok(Column::Float(out))
    } else {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let x = value.as_int().map_err(|typ| -> Box<EvalAltResult> {
                format!("column '{name}' expected int, got {typ}").into()
            })?;
            out.push(x);
        }
        Ok(Column::Int(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> Frame {
        let mut frame = Frame::new();
        frame
            .set_column(
                "TradingDay",
                Column::Str(vec!["2024-01-02".into(), "2024-01-03".into()]),
            )
            .unwrap();
        frame
            .set_column("SecuCode", Column::Int(vec![1, 600000]))
            .unwrap();
        frame
            .set_column("ClosePrice", Column::Float(vec![10.0, 12.0]))
            .unwrap();
        frame
    }

    fn bind(host: &ScriptHost, script: &str, entry: &str) -> BoundUnit {
        let ast = host.compile(script).unwrap();
        BoundUnit::new(ast, entry)
    }

    #[test]
    fn call_returns_a_frame_built_by_the_script() {
        let host = ScriptHost::new();
        let script = r#"
            fn alpha(panel, index) {
                let out = panel.select(["TradingDay", "SecuCode"]);
                let close = panel.column("ClosePrice");
                let doubled = [];
                for value in close {
                    doubled.push(value * 2.0);
                }
                out.set_column("alpha", doubled);
                out
            }
        "#;
        let unit = bind(&host, script, "alpha");
        let result = host.call(&unit, panel(), Frame::new()).unwrap();
        let frame = result.try_cast::<Frame>().unwrap();
        assert_eq!(frame.column_names(), vec!["TradingDay", "SecuCode", "alpha"]);
        match frame.column("alpha") {
            Some(Column::Float(values)) => assert_eq!(values, &vec![20.0, 24.0]),
            other => panic!("Expected Float column, got {other:?}"),
        }
    }

    #[test]
    fn scripts_receive_copies_not_the_originals() {
        let host = ScriptHost::new();
        let script = r#"
            fn alpha(panel, index) {
                panel.set_column("SecuCode", ["a", "b"]);
                panel
            }
        "#;
        let unit = bind(&host, script, "alpha");
        let original = panel();
        let _ = host.call(&unit, original.clone(), Frame::new()).unwrap();
        match original.column("SecuCode") {
            Some(Column::Int(values)) => assert_eq!(values, &vec![1, 600000]),
            other => panic!("Original mutated: {other:?}"),
        }
    }

    #[test]
    fn unknown_column_surfaces_as_runtime_diagnostic() {
        let host = ScriptHost::new();
        let script = r#"
            fn alpha(panel, index) {
                panel.column("Volume")
            }
        "#;
        let unit = bind(&host, script, "alpha");
        let err = host.call(&unit, panel(), Frame::new()).unwrap_err();
        assert!(err.to_string().contains("unknown column 'Volume'"));
    }

    #[test]
    fn compile_error_is_a_message_not_a_panic() {
        let host = ScriptHost::new();
        let err = host.compile("fn alpha(panel, index) {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn script_functions_are_sorted() {
        let host = ScriptHost::new();
        let ast = host
            .compile("fn zeta(a, b) { a }\nfn alpha(a, b) { b }\nfn mid(x) { x }")
            .unwrap();
        assert_eq!(host.script_functions(&ast), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn mixed_int_and_float_columns_promote_to_float() {
        let host = ScriptHost::new();
        let script = r#"
            fn alpha(panel, index) {
                let out = panel.select(["TradingDay"]);
                out.set_column("alpha", [1, 2.5]);
                out
            }
        "#;
        let unit = bind(&host, script, "alpha");
        let frame = host
            .call(&unit, panel(), Frame::new())
            .unwrap()
            .try_cast::<Frame>()
            .unwrap();
        match frame.column("alpha") {
            Some(Column::Float(values)) => assert_eq!(values, &vec![1.0, 2.5]),
            other => panic!("Expected Float column, got {other:?}"),
        }
    }

    #[test]
    fn unit_values_become_nan_holes() {
        let host = ScriptHost::new();
        let script = r#"
            fn alpha(panel, index) {
                let out = panel.select(["TradingDay"]);
                out.set_column("alpha", [(), 3.0]);
                out
            }
        "#;
        let unit = bind(&host, script, "alpha");
        let frame = host
            .call(&unit, panel(), Frame::new())
            .unwrap()
            .try_cast::<Frame>()
            .unwrap();
        match frame.column("alpha") {
            Some(Column::Float(values)) => {
                assert!(values[0].is_nan());
                assert_eq!(values[1], 3.0);
            }
            other => panic!("Expected Float column, got {other:?}"),
        }
    }

    #[test]
    fn mixing_strings_and_numbers_is_rejected() {
        let host = ScriptHost::new();
        let script = r#"
            fn alpha(panel, index) {
                let out = panel.select(["TradingDay"]);
                out.set_column("alpha", ["a", 1.0]);
                out
            }
        "#;
        let unit = bind(&host, script, "alpha");
        let err = host.call(&unit, panel(), Frame::new()).unwrap_err();
        assert!(err.to_string().contains("mixes strings and numbers"));
    }

    #[test]
    fn runtime_error_carries_position_information() {
        let host = ScriptHost::new();
        let script = "fn alpha(panel, index) {\n    let x = [];\n    x[3]\n}";
        let unit = bind(&host, script, "alpha");
        let err = host.call(&unit, panel(), Frame::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("3") || message.to_lowercase().contains("index"));
    }
}
