//! Workflow validation: run this before executing a hand-built or loaded workflow.
//!
//! Rules enforced:
//! 1. Node names must be unique within the scope that directly contains them
//!    (the root sequence, or one group's children).  Branch children publish
//!    into the logic node's scope and count towards it.
//! 2. Every reference must name a node declared somewhere in the same
//!    workflow instance.
//! 3. A child of a parallel group must not read a sibling's output.
//!
//! Subflows are validated recursively as independent instances.  The driver
//! does not call this; collisions are a caller error it will not detect.

use std::collections::HashSet;

use crate::node::{ExecutionMode, LogicKind, Node};
use crate::EngineError;

/// Validate a root sequence of nodes.
///
/// # Errors
/// - [`EngineError::DuplicateNodeName`] if two nodes in one scope share a name.
/// - [`EngineError::UnknownReference`] if a binding names a node that doesn't exist.
/// - [`EngineError::ParallelSiblingReference`] if parallel siblings depend on each other.
pub fn validate(nodes: &[Node]) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Unique names per scope
    // -----------------------------------------------------------------------
    check_scope("<root>", nodes)?;

    // -----------------------------------------------------------------------
    // 2. References point at declared nodes
    // -----------------------------------------------------------------------
    let mut declared: HashSet<&str> = HashSet::new();
    for node in nodes {
        collect_names(node, &mut declared);
    }
    for node in nodes {
        check_references(node, &declared)?;
    }

    // -----------------------------------------------------------------------
    // 3. Parallel siblings are input-independent; recurse into subflows
    // -----------------------------------------------------------------------
    for node in nodes {
        check_nested(node)?;
    }

    Ok(())
}

fn scope_names<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    out.push(node.name());
    if let Node::Logic(logic) = node {
        if let LogicKind::Branch { then, otherwise, .. } = &logic.kind {
            scope_names(then, out);
            if let Some(otherwise) = otherwise {
                scope_names(otherwise, out);
            }
        }
    }
}

fn check_scope(scope: &str, nodes: &[Node]) -> Result<(), EngineError> {
    let mut names = Vec::new();
    for node in nodes {
        scope_names(node, &mut names);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(EngineError::DuplicateNodeName {
                scope: scope.to_owned(),
                name: name.to_owned(),
            });
        }
    }

    for node in nodes {
        for_each_child_scope(node, &mut |name, children| check_scope(name, children))?;
    }
    Ok(())
}

/// Visit every group reachable without crossing a subflow boundary.
fn for_each_child_scope<'a, F>(node: &'a Node, f: &mut F) -> Result<(), EngineError>
where
    F: FnMut(&'a str, &'a [Node]) -> Result<(), EngineError>,
{
    match node {
        Node::Group(group) => f(&group.name, &group.children),
        Node::Logic(logic) => match &logic.kind {
            LogicKind::Branch { then, otherwise, .. } => {
                for_each_child_scope(then, f)?;
                match otherwise {
                    Some(otherwise) => for_each_child_scope(otherwise, f),
                    None => Ok(()),
                }
            }
            LogicKind::Effect(_) => Ok(()),
        },
        Node::Unit(_) | Node::Subflow(_) => Ok(()),
    }
}

fn collect_names<'a>(node: &'a Node, out: &mut HashSet<&'a str>) {
    out.insert(node.name());
    match node {
        Node::Group(group) => group.children.iter().for_each(|c| collect_names(c, out)),
        Node::Logic(logic) => {
            if let LogicKind::Branch { then, otherwise, .. } = &logic.kind {
                collect_names(then, out);
                if let Some(otherwise) = otherwise {
                    collect_names(otherwise, out);
                }
            }
        }
        Node::Unit(_) | Node::Subflow(_) => {}
    }
}

fn check_references(node: &Node, declared: &HashSet<&str>) -> Result<(), EngineError> {
    match node {
        Node::Unit(unit) => {
            for binding in unit.inputs.values() {
                if let Some(reference) = binding.as_reference() {
                    if !declared.contains(reference.node()) {
                        return Err(EngineError::UnknownReference {
                            node: unit.name.clone(),
                            reference: reference.to_string(),
                        });
                    }
                }
            }
            Ok(())
        }
        Node::Group(group) => group
            .children
            .iter()
            .try_for_each(|c| check_references(c, declared)),
        Node::Logic(logic) => match &logic.kind {
            LogicKind::Branch { then, otherwise, .. } => {
                check_references(then, declared)?;
                match otherwise {
                    Some(otherwise) => check_references(otherwise, declared),
                    None => Ok(()),
                }
            }
            LogicKind::Effect(_) => Ok(()),
        },
        Node::Subflow(_) => Ok(()),
    }
}

/// Every reference made anywhere under `node`, paired with the unit making it.
fn references_under<'a>(node: &'a Node, out: &mut Vec<(&'a str, String, &'a str)>) {
    match node {
        Node::Unit(unit) => {
            for binding in unit.inputs.values() {
                if let Some(reference) = binding.as_reference() {
                    out.push((unit.name.as_str(), reference.to_string(), reference.node()));
                }
            }
        }
        Node::Group(group) => group.children.iter().for_each(|c| references_under(c, out)),
        Node::Logic(logic) => {
            if let LogicKind::Branch { then, otherwise, .. } = &logic.kind {
                references_under(then, out);
                if let Some(otherwise) = otherwise {
                    references_under(otherwise, out);
                }
            }
        }
        Node::Subflow(_) => {}
    }
}

fn check_nested(node: &Node) -> Result<(), EngineError> {
    match node {
        Node::Subflow(sub) => sub.workflow.validate(),
        Node::Group(group) => {
            if group.mode == ExecutionMode::Parallel {
                for (index, child) in group.children.iter().enumerate() {
                    let mut sibling_names = HashSet::new();
                    for (other_index, other) in group.children.iter().enumerate() {
                        if other_index != index {
                            collect_names(other, &mut sibling_names);
                        }
                    }
                    let mut refs = Vec::new();
                    references_under(child, &mut refs);
                    if let Some((unit, reference, _)) =
                        refs.into_iter().find(|(_, _, target)| sibling_names.contains(target))
                    {
                        return Err(EngineError::ParallelSiblingReference {
                            node: unit.to_owned(),
                            reference,
                        });
                    }
                }
            }
            group.children.iter().try_for_each(check_nested)
        }
        Node::Logic(logic) => match &logic.kind {
            LogicKind::Branch { then, otherwise, .. } => {
                check_nested(then)?;
                match otherwise {
                    Some(otherwise) => check_nested(otherwise),
                    None => Ok(()),
                }
            }
            LogicKind::Effect(_) => Ok(()),
        },
        Node::Unit(_) => Ok(()),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Group, Logic, Subflow, Unit};
    use crate::Workflow;
    use nodes::mock::MockNode;
    use serde_json::json;

    fn unit(name: &str) -> Node {
        Unit::new(name, MockNode::returning(name, json!({ "ok": true }))).into()
    }

    fn reading(name: &str, reference: &str) -> Node {
        Unit::new(name, MockNode::echo(name))
            .bind("in", reference)
            .expect("valid reference")
            .into()
    }

    #[test]
    fn valid_linear_workflow() {
        let nodes = vec![unit("a"), reading("b", "a.ok"), reading("c", "b.in")];
        assert!(validate(&nodes).is_ok());
    }

    #[test]
    fn duplicate_name_in_root_is_rejected() {
        let nodes = vec![unit("a"), unit("a")];
        assert!(matches!(
            validate(&nodes),
            Err(EngineError::DuplicateNodeName { name, .. }) if name == "a"
        ));
    }

    #[test]
    fn same_name_in_different_scopes_is_allowed() {
        let nodes = vec![
            unit("a"),
            Group::sequential("g", vec![unit("a")]).into(),
        ];
        assert!(validate(&nodes).is_ok());
    }

    #[test]
    fn duplicate_inside_group_is_rejected() {
        let nodes = vec![Group::parallel("fan", vec![unit("x"), unit("x")]).into()];
        assert!(matches!(
            validate(&nodes),
            Err(EngineError::DuplicateNodeName { scope, name }) if scope == "fan" && name == "x"
        ));
    }

    #[test]
    fn branch_children_share_the_enclosing_scope() {
        let nodes = vec![
            unit("a"),
            Logic::branch("route", |_| Ok(true), unit("a"), None).into(),
        ];
        assert!(matches!(validate(&nodes), Err(EngineError::DuplicateNodeName { .. })));
    }

    #[test]
    fn reference_to_missing_node_is_rejected() {
        let nodes = vec![unit("a"), reading("b", "ghost.value")];
        assert!(matches!(
            validate(&nodes),
            Err(EngineError::UnknownReference { node, reference })
                if node == "b" && reference == "ghost.value"
        ));
    }

    #[test]
    fn parallel_sibling_dependency_is_rejected() {
        let nodes = vec![Group::parallel("fan", vec![unit("a"), reading("b", "a.ok")]).into()];
        assert!(matches!(
            validate(&nodes),
            Err(EngineError::ParallelSiblingReference { node, .. }) if node == "b"
        ));
    }

    #[test]
    fn subflows_are_validated_independently() {
        let inner = Workflow::new("inner", vec![unit("x"), unit("x")]);
        let nodes = vec![Subflow::new("s", inner).into(), reading("after", "s.x.ok")];
        assert!(matches!(validate(&nodes), Err(EngineError::DuplicateNodeName { .. })));

        let inner = Workflow::new("inner", vec![unit("x")]);
        let nodes = vec![Subflow::new("s", inner).into(), reading("after", "s.x.ok")];
        assert!(validate(&nodes).is_ok());
    }

    #[test]
    fn empty_workflow_is_valid() {
        assert!(validate(&[]).is_ok());
    }
}
