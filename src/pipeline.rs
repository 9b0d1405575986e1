//! Pipeline (§2): sequences the full compilation — build every clause,
//! connect relations/ios to their producers, optimize to a joint fixpoint,
//! classify induction, classify differential-update capability, then
//! finalize — accumulating diagnostics along the way rather than aborting
//! on the first recoverable error (§7).

use tracing::{info, warn};

use crate::ast::Module;
use crate::builder;
use crate::config::CompilerConfig;
use crate::connector;
use crate::differential;
use crate::dfg::Dfg;
use crate::error::{CoreError, CoreResult, Diagnostics};
use crate::finalize::{self, FinalizedDfg};
use crate::induction;
use crate::optimize;
use crate::relation::IoDirection;

/// The result of a full compilation run: the finalized DFG plus every
/// diagnostic accumulated along the way.
#[derive(Debug)]
pub struct CompileOutput {
    pub dfg: FinalizedDfg,
    pub diagnostics: Diagnostics,
}

/// Runs the full pipeline over `module` (§2: builder → connector →
/// optimize(canonicalize+CSE+dead-flow) → induction → differential →
/// finalize).
///
/// A per-clause [`CoreError::Structural`]/[`CoreError::Semantic`] is
/// folded into the returned `diagnostics` and that clause simply
/// contributes no flow; the rest of the module still compiles (§7:
/// "errors are accumulated; the compiler continues until a pass would
/// require assuming well-formed input"). A [`CoreError::Internal`]
/// aborts immediately — no finalized output is produced.
pub fn compile_module(module: &Module, config: &CompilerConfig) -> CoreResult<CompileOutput> {
    info!(module = %module.name, clauses = module.clauses.len(), "compiling module");
    let mut dfg = Dfg::new();
    let mut diagnostics = Diagnostics::new();

    for rule in &module.clauses {
        if let Err(err) = builder::build_clause(&mut dfg, module, rule) {
            if err.is_internal() {
                return Err(err);
            }
            warn!(head = %rule.head.relation, %err, "clause produced no flow");
            diagnostics.push(into_diagnostic(err));
        }
    }

    connector::connect(&mut dfg, module);
    wire_declared_attributes(&mut dfg, module, &mut diagnostics);

    info!("running optimizer to fixpoint");
    optimize::run(&mut dfg, &config.fixpoint);

    induction::classify(&mut dfg, module, &config.induction, &mut diagnostics)?;
    differential::classify(&mut dfg, &mut diagnostics);

    let finalized = finalize::finalize(&mut dfg, &config.fixpoint);
    info!(views = finalized.views().count(), diagnostics = diagnostics.len(), "compilation finished");

    Ok(CompileOutput { dfg: finalized, diagnostics })
}

fn into_diagnostic(err: CoreError) -> crate::error::Diagnostic {
    match err {
        CoreError::Structural(d) | CoreError::Semantic(d) => d,
        CoreError::Internal(d, _) => d,
    }
}

/// Populates `Io::direction`/`declared_differential` from each message
/// declaration (§6: `message (differential optional)`), and diagnoses a
/// message declared with both receives and transmits (§7 kind 2).
///
/// The builder/connector only ever allocate an `Io` lazily by name, so
/// this has to run after every clause is built and connected, once an
/// io's full set of selects/inserts for the module is known.
fn wire_declared_attributes(dfg: &mut Dfg, module: &Module, diagnostics: &mut Diagnostics) {
    for id in dfg.ios.ids().collect::<Vec<_>>() {
        let name = dfg.ios[id].name.clone();
        let Some(decl) = module.declaration(&name) else {
            continue;
        };
        if !decl.is_message() {
            continue;
        }
        if let Some(attrs) = &decl.message {
            dfg.ios[id].declared_differential = attrs.differential;
        }

        let has_selects = !dfg.ios[id].selects.is_empty();
        let has_inserts = !dfg.ios[id].inserts.is_empty();
        dfg.ios[id].direction = match (has_selects, has_inserts) {
            (true, true) => {
                diagnostics.report(format!("message `{name}` has both receives and transmits"));
                None
            }
            (true, false) => Some(IoDirection::Receive),
            (false, true) => Some(IoDirection::Transmit),
            (false, false) => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{DeclarationBuilder, RuleBuilder};
    use crate::ast::{Atom, Rule, Term};

    fn fact(relation: &str, values: impl IntoIterator<Item = i64>) -> Rule {
        let args = values.into_iter().map(Term::Constant).collect();
        Rule::new(Atom::new(relation, args), Vec::new())
    }

    #[test]
    fn single_fact_clause_compiles_to_one_insert() {
        let mut module = Module::new("m");
        module.clauses.push(fact("foo", [1, 2, 3]));

        let output = compile_module(&module, &CompilerConfig::default()).unwrap();
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.dfg.views_of_kind("INSERT").count(), 1);
        assert_eq!(output.dfg.views_of_kind("JOIN").count(), 0);
    }

    #[test]
    fn unsafe_head_variable_is_diagnosed_not_fatal() {
        let mut module = Module::new("m");
        module.clauses.push(RuleBuilder::new("bad").head_vars(["x"]).build());
        module.clauses.push(fact("ok", [1]));

        let output = compile_module(&module, &CompilerConfig::default()).unwrap();
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.dfg.views_of_kind("INSERT").count() >= 1);
    }

    #[test]
    fn message_declared_with_both_directions_is_diagnosed() {
        let mut module = Module::new("m");
        module
            .declarations
            .push(DeclarationBuilder::new("evt").as_message(false).build());
        module.clauses.push(fact("evt", [1]));
        module.clauses.push(
            RuleBuilder::new("consumer")
                .head_vars(["x"])
                .body_atom("evt", ["x"])
                .build(),
        );

        let output = compile_module(&module, &CompilerConfig::default()).unwrap();
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.message.contains("both receives and transmits")));
    }
}
