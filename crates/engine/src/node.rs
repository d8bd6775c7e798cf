//! The component model: a closed sum type over every kind of node a
//! workflow can contain.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use nodes::{ExecutableNode, FnNode, Inputs, NodeError, Outputs, RetryPolicy, Retrying};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reference::Binding;
use crate::store::StoreView;
use crate::workflow::Workflow;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One node of the execution tree.
pub enum Node {
    Unit(Unit),
    Group(Group),
    Subflow(Subflow),
    Logic(Logic),
}

impl Node {
    /// Name, unique within the scope that directly contains the node.
    pub fn name(&self) -> &str {
        match self {
            Node::Unit(n) => &n.name,
            Node::Group(n) => &n.name,
            Node::Subflow(n) => &n.name,
            Node::Logic(n) => &n.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Node::Unit(n) => &n.description,
            Node::Group(n) => &n.description,
            Node::Subflow(n) => &n.description,
            Node::Logic(n) => &n.description,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Unit(_) => NodeKind::Unit,
            Node::Group(_) => NodeKind::Group,
            Node::Subflow(_) => NodeKind::Subflow,
            Node::Logic(_) => NodeKind::Logic,
        }
    }

    /// Put every nested subflow back into `NotStarted`.
    pub(crate) fn reset(&mut self) {
        match self {
            Node::Unit(_) => {}
            Node::Group(group) => group.children.iter_mut().for_each(Node::reset),
            Node::Subflow(sub) => sub.workflow.reset(),
            Node::Logic(logic) => {
                if let LogicKind::Branch { then, otherwise, .. } = &mut logic.kind {
                    then.reset();
                    if let Some(otherwise) = otherwise {
                        otherwise.reset();
                    }
                }
            }
        }
    }

    pub(crate) fn write_outline(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match self {
            Node::Unit(unit) => {
                out.push_str(&format!("{indent}- unit {}", unit.name));
                if !unit.inputs.is_empty() {
                    let inputs: Vec<String> = unit
                        .inputs
                        .iter()
                        .map(|(k, b)| match b {
                            Binding::Literal(v) => format!("{k}={v}"),
                            Binding::Reference(r) => format!("{k}<-{r}"),
                        })
                        .collect();
                    out.push_str(&format!(" ({})", inputs.join(", ")));
                }
                out.push('\n');
            }
            Node::Group(group) => {
                out.push_str(&format!("{indent}- group {} [{}]\n", group.name, group.mode));
                for child in &group.children {
                    child.write_outline(depth + 1, out);
                }
            }
            Node::Subflow(sub) => {
                out.push_str(&format!("{indent}- subflow {}\n", sub.name));
                for child in sub.workflow.nodes() {
                    child.write_outline(depth + 1, out);
                }
            }
            Node::Logic(logic) => match &logic.kind {
                LogicKind::Branch { then, otherwise, .. } => {
                    out.push_str(&format!("{indent}- branch {}\n", logic.name));
                    then.write_outline(depth + 1, out);
                    if let Some(otherwise) = otherwise {
                        otherwise.write_outline(depth + 1, out);
                    }
                }
                LogicKind::Effect(_) => out.push_str(&format!("{indent}- effect {}\n", logic.name)),
            },
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Discriminant of [`Node`], used in execution history and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Unit,
    Group,
    Subflow,
    Logic,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Unit => "unit",
            NodeKind::Group => "group",
            NodeKind::Subflow => "subflow",
            NodeKind::Logic => "logic",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// Leaf work item: declared input bindings plus an async computation.
pub struct Unit {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) inputs: BTreeMap<String, Binding>,
    pub(crate) task: Arc<dyn ExecutableNode>,
}

impl Unit {
    pub fn new(name: impl Into<String>, task: impl ExecutableNode + 'static) -> Self {
        Self::from_arc(name, Arc::new(task))
    }

    pub fn from_arc(name: impl Into<String>, task: Arc<dyn ExecutableNode>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            inputs: BTreeMap::new(),
            task,
        }
    }

    /// A unit whose computation is an async closure over its inputs.
    pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Inputs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outputs, NodeError>> + Send + 'static,
    {
        Self::new(name, FnNode::new(func))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Bind `key` to another node's output, e.g. `bind("x", "A.x")`.
    pub fn bind(mut self, key: impl Into<String>, reference: &str) -> Result<Self, EngineError> {
        self.inputs.insert(key.into(), Binding::reference(reference)?);
        Ok(self)
    }

    /// Bind `key` to a fixed value.
    pub fn literal(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), Binding::literal(value));
        self
    }

    pub fn input(mut self, key: impl Into<String>, binding: Binding) -> Self {
        self.inputs.insert(key.into(), binding);
        self
    }

    /// Wrap the computation in a [`Retrying`] wrapper.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.task = Arc::new(Retrying::new(self.task, policy));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &BTreeMap<String, Binding> {
        &self.inputs
    }
}

impl From<Unit> for Node {
    fn from(unit: Unit) -> Self {
        Node::Unit(unit)
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// How a group runs its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One at a time, in order; the first failure stops the rest.
    Sequential,
    /// All at once; failures are absorbed and the group waits for everyone.
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("sequential"),
            ExecutionMode::Parallel => f.write_str("parallel"),
        }
    }
}

/// Ordered collection of child nodes.
pub struct Group {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) mode: ExecutionMode,
    pub(crate) children: Vec<Node>,
}

impl Group {
    pub fn new(name: impl Into<String>, mode: ExecutionMode, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            mode,
            children,
        }
    }

    pub fn sequential(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self::new(name, ExecutionMode::Sequential, children)
    }

    pub fn parallel(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self::new(name, ExecutionMode::Parallel, children)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::Group(group)
    }
}

// ---------------------------------------------------------------------------
// Subflow
// ---------------------------------------------------------------------------

/// A nested workflow instance with its own state and output namespace.
pub struct Subflow {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) workflow: Box<Workflow>,
}

impl Subflow {
    pub fn new(name: impl Into<String>, workflow: Workflow) -> Self {
        let description = workflow.description().to_owned();
        Self {
            name: name.into(),
            description,
            workflow: Box::new(workflow),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The nested instance, e.g. to inspect its own failure details after a run.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}

impl From<Subflow> for Node {
    fn from(subflow: Subflow) -> Self {
        Node::Subflow(subflow)
    }
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

/// Branch condition, evaluated against the outputs visible at that point.
pub type Predicate = dyn Fn(&StoreView<'_>) -> Result<bool, NodeError> + Send + Sync;

/// Inline side effect.
pub type Effect = dyn Fn(&StoreView<'_>) -> Result<(), NodeError> + Send + Sync;

pub enum LogicKind {
    /// Run `then` when the condition holds, `otherwise` (if any) when it doesn't.
    Branch {
        condition: Arc<Predicate>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },
    Effect(Arc<Effect>),
}

/// Branching or side-effecting node.  Fails and propagates like a unit.
pub struct Logic {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) kind: LogicKind,
}

impl Logic {
    pub fn branch<P>(
        name: impl Into<String>,
        condition: P,
        then: impl Into<Node>,
        otherwise: Option<Node>,
    ) -> Self
    where
        P: Fn(&StoreView<'_>) -> Result<bool, NodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            kind: LogicKind::Branch {
                condition: Arc::new(condition),
                then: Box::new(then.into()),
                otherwise: otherwise.map(Box::new),
            },
        }
    }

    pub fn effect<E>(name: impl Into<String>, effect: E) -> Self
    where
        E: Fn(&StoreView<'_>) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            kind: LogicKind::Effect(Arc::new(effect)),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(&self) -> &LogicKind {
        &self.kind
    }
}

impl From<Logic> for Node {
    fn from(logic: Logic) -> Self {
        Node::Logic(logic)
    }
}
