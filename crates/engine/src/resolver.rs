//! Input resolution.
//!
//! Runs when a node begins execution, never at construction time, so a
//! reference may point at output produced earlier in the same run.

use std::collections::BTreeMap;

use nodes::Inputs;
use tracing::debug;

use crate::reference::Binding;
use crate::store::StoreView;

/// Turn declared bindings into the concrete inputs a unit receives.
///
/// Literals pass through.  References are replaced with the value currently
/// visible at that key; a reference to a key that was never written is left
/// out, and the unit decides whether that is fatal.
pub fn resolve(bindings: &BTreeMap<String, Binding>, view: &StoreView<'_>) -> Inputs {
    let mut inputs = Inputs::new();
    for (name, binding) in bindings {
        match binding {
            Binding::Literal(value) => inputs.insert(name.clone(), value.clone()),
            Binding::Reference(reference) => match view.lookup(reference) {
                Some(value) => inputs.insert(name.clone(), value.clone()),
                None => debug!(input = %name, reference = %reference, "reference unresolved"),
            },
        }
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OutputStore;
    use nodes::Outputs;
    use serde_json::json;

    fn bindings() -> BTreeMap<String, Binding> {
        let mut b = BTreeMap::new();
        b.insert("x".to_string(), Binding::reference("A.x").unwrap());
        b.insert("missing".to_string(), Binding::reference("Z.q").unwrap());
        b.insert("limit".to_string(), Binding::literal(10));
        b
    }

    #[test]
    fn literals_pass_and_references_resolve() {
        let mut store = OutputStore::new();
        store.publish("A", Outputs::new().with("x", json!(1)));

        let inputs = resolve(&bindings(), &StoreView::new(&store));
        assert_eq!(inputs.get("x"), Some(&json!(1)));
        assert_eq!(inputs.get("limit"), Some(&json!(10)));
        assert!(!inputs.contains("missing"));
    }

    #[test]
    fn unresolved_reference_falls_back_to_literal() {
        let store = OutputStore::new();
        let inputs = resolve(&bindings(), &StoreView::new(&store));
        assert_eq!(inputs.get_or("missing", "fallback".to_string()), "fallback");
        assert_eq!(inputs.get_or("x", 42i64), 42);
    }
}
