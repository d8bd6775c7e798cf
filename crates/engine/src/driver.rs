//! Workflow execution driver.
//!
//! The driver walks the root sequence depth-first and dispatches each node by
//! kind:
//! 1. Sequential scopes (the root and sequential groups) run children in
//!    declaration order; the first failure stops the remaining siblings and
//!    becomes the scope's failure.
//! 2. Parallel groups start every child at once and wait for all of them.
//!    Child failures are recorded as absorbed and never fail the group.
//! 3. Subflows run their nested instance; a failure there is a failure of the
//!    subflow node in the enclosing scope.
//! 4. Logic nodes evaluate their predicate or effect and fail like a unit.
//!
//! The output store is owned here.  Node bodies only ever see a read-only
//! [`StoreView`]; every node hands its writes back and the driver merges them
//! once the node (or, for parallel groups, the join) has finished.

use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use nodes::ExecutionContext;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::node::{ExecutionMode, Group, Logic, LogicKind, Node, Subflow, Unit};
use crate::resolver::resolve;
use crate::store::{OutputStore, StoreView};
use crate::workflow::{NodeExecution, NodeStatus, RunState, Workflow};
use crate::{EngineError, FailureDetails};

// ---------------------------------------------------------------------------
// Per-node report
// ---------------------------------------------------------------------------

/// What running one node (or one scope) produced.
#[derive(Debug, Default)]
struct Report {
    /// Set when the node failed; decides what the enclosing scope does.
    failure: Option<FailureDetails>,
    /// Failures swallowed by parallel groups underneath.
    absorbed: Vec<FailureDetails>,
    history: Vec<NodeExecution>,
}

impl Report {
    fn failed(failure: FailureDetails) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Keep `other`'s absorbed failures and history; its `failure` is the
    /// caller's to decide on.
    fn absorb(&mut self, other: Report) -> Option<FailureDetails> {
        self.absorbed.extend(other.absorbed);
        self.history.extend(other.history);
        other.failure
    }
}

struct NodeRun {
    writes: OutputStore,
    report: Report,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run `workflow` to a terminal state.  Returns immediately when the
/// instance has already been started.
pub(crate) fn run_workflow(workflow: &mut Workflow) -> BoxFuture<'_, RunState> {
    Box::pin(drive(workflow))
}

#[instrument(skip_all, fields(workflow = %workflow.name))]
async fn drive(workflow: &mut Workflow) -> RunState {
    if workflow.state != RunState::NotStarted {
        warn!(state = %workflow.state, "workflow already started; reset it before running again");
        return workflow.state;
    }

    let run_id = Uuid::new_v4();
    workflow.run_id = Some(run_id);
    workflow.state = RunState::Running;
    info!(%run_id, nodes = workflow.nodes.len(), "workflow started");

    let driver = Driver {
        workflow: workflow.name.clone(),
        run_id,
    };
    let report = driver
        .run_sequence(&mut workflow.nodes, None, &mut workflow.store, "")
        .await;

    workflow.absorbed = report.absorbed;
    workflow.history = report.history;
    workflow.state = match report.failure {
        None => RunState::Completed,
        Some(failure) => {
            let state = if failure.error.is_cancellation() {
                RunState::Canceled
            } else {
                RunState::Failed
            };
            error!(%run_id, node = %failure.node, error = %failure.error, "workflow {state}");
            workflow.failure = Some(failure);
            state
        }
    };

    if workflow.state == RunState::Completed {
        info!(
            %run_id,
            outputs = workflow.store.len(),
            absorbed = workflow.absorbed.len(),
            "workflow completed"
        );
    }
    workflow.state
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Driver {
    workflow: String,
    run_id: Uuid,
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}/{name}")
    }
}

impl Driver {
    /// Run `nodes` one at a time, publishing into `local` after each one so
    /// node N+1 sees node N's outputs.  Stops at the first failure.
    fn run_sequence<'a>(
        &'a self,
        nodes: &'a mut [Node],
        parent: Option<&'a StoreView<'a>>,
        local: &'a mut OutputStore,
        scope: &'a str,
    ) -> BoxFuture<'a, Report> {
        Box::pin(async move {
            let mut report = Report::default();
            let total = nodes.len();

            for (index, node) in nodes.iter_mut().enumerate() {
                let run = {
                    let view = StoreView::layered(local, parent);
                    self.run_node(node, &view, scope).await
                };
                local.merge(run.writes);

                if let Some(failure) = report.absorb(run.report) {
                    let skipped = total - index - 1;
                    warn!(
                        scope = scope_label(scope),
                        node = %failure.node,
                        error = %failure.error,
                        skipped,
                        "sequential scope aborted"
                    );
                    report.failure = Some(failure);
                    break;
                }
            }

            report
        })
    }

    fn run_node<'a>(
        &'a self,
        node: &'a mut Node,
        view: &'a StoreView<'a>,
        scope: &'a str,
    ) -> BoxFuture<'a, NodeRun> {
        Box::pin(async move {
            let path = qualify(scope, node.name());
            let kind = node.kind();
            let started_at = Utc::now();
            debug!(node = %path, %kind, "node started");

            let mut run = match node {
                Node::Unit(unit) => self.run_unit(unit, view, &path).await,
                Node::Group(group) => self.run_group(group, view, &path).await,
                Node::Subflow(sub) => self.run_subflow(sub).await,
                Node::Logic(logic) => self.run_logic(logic, view, scope, &path).await,
            };

            let status = match &run.report.failure {
                Some(failure) => {
                    debug!(node = %path, error = %failure.error, "node failed");
                    NodeStatus::Failed
                }
                None => {
                    debug!(node = %path, writes = run.writes.len(), "node succeeded");
                    NodeStatus::Succeeded
                }
            };
            run.report.history.push(NodeExecution {
                path,
                kind,
                status,
                started_at,
                finished_at: Utc::now(),
            });
            run
        })
    }

    async fn run_unit(&self, unit: &Unit, view: &StoreView<'_>, path: &str) -> NodeRun {
        let inputs = resolve(&unit.inputs, view);
        let ctx = ExecutionContext {
            workflow: self.workflow.clone(),
            run_id: self.run_id,
            node_path: path.to_owned(),
        };

        let mut writes = OutputStore::new();
        let report = match unit.task.execute(inputs, &ctx).await {
            Ok(outputs) => {
                writes.publish(&unit.name, outputs);
                Report::default()
            }
            Err(err) => Report::failed(FailureDetails::new(
                &unit.name,
                EngineError::from_unit(&unit.name, err),
            )),
        };
        NodeRun { writes, report }
    }

    async fn run_group(&self, group: &mut Group, view: &StoreView<'_>, path: &str) -> NodeRun {
        match group.mode {
            ExecutionMode::Sequential => {
                // Groups share their parent's namespace, so a failing child
                // keeps its own attribution when the group fails.
                let mut writes = OutputStore::new();
                let report = self
                    .run_sequence(&mut group.children, Some(view), &mut writes, path)
                    .await;
                NodeRun { writes, report }
            }
            ExecutionMode::Parallel => {
                let runs = join_all(
                    group
                        .children
                        .iter_mut()
                        .map(move |child| self.run_node(child, view, path)),
                )
                .await;

                let mut writes = OutputStore::new();
                let mut report = Report::default();
                for run in runs {
                    writes.merge(run.writes);
                    if let Some(failure) = report.absorb(run.report) {
                        warn!(
                            group = %path,
                            node = %failure.node,
                            error = %failure.error,
                            "parallel child failed; continuing"
                        );
                        report.absorbed.push(failure);
                    }
                }
                NodeRun { writes, report }
            }
        }
    }

    async fn run_subflow(&self, sub: &mut Subflow) -> NodeRun {
        let mut writes = OutputStore::new();

        let actual = sub.workflow.state();
        if actual != RunState::NotStarted {
            let error = EngineError::InvalidState {
                target: sub.name.clone(),
                expected: RunState::NotStarted,
                actual,
            };
            return NodeRun {
                writes,
                report: Report::failed(FailureDetails::new(&sub.name, error)),
            };
        }

        let state = run_workflow(&mut sub.workflow).await;

        // Republish under the subflow's name so the parent can read "S.X.y".
        for (key, value) in sub.workflow.outputs().iter() {
            writes.insert(format!("{}.{}", sub.name, key), value.clone());
        }

        let report = if state == RunState::Completed {
            Report::default()
        } else {
            let inner = sub.workflow.failure().cloned().unwrap_or_else(|| {
                FailureDetails::new(
                    sub.workflow.name(),
                    EngineError::InvalidState {
                        target: sub.workflow.name().to_owned(),
                        expected: RunState::Completed,
                        actual: state,
                    },
                )
            });
            Report::failed(FailureDetails::new(
                &sub.name,
                EngineError::Subflow {
                    node: sub.name.clone(),
                    inner: Box::new(inner),
                },
            ))
        };
        NodeRun { writes, report }
    }

    /// Branch children run in the logic node's enclosing scope and publish
    /// under their own names; a failing child is reported as itself.
    async fn run_logic(
        &self,
        logic: &mut Logic,
        view: &StoreView<'_>,
        scope: &str,
        path: &str,
    ) -> NodeRun {
        let name = logic.name.clone();
        match &mut logic.kind {
            LogicKind::Effect(effect) => {
                let report = match (**effect)(view) {
                    Ok(()) => Report::default(),
                    Err(err) => Report::failed(FailureDetails::new(
                        &name,
                        EngineError::from_logic(&name, err),
                    )),
                };
                NodeRun {
                    writes: OutputStore::new(),
                    report,
                }
            }
            LogicKind::Branch {
                condition,
                then,
                otherwise,
            } => {
                let taken = match (**condition)(view) {
                    Ok(true) => Some(("then", &mut **then)),
                    Ok(false) => otherwise.as_deref_mut().map(|node| ("else", node)),
                    Err(err) => {
                        return NodeRun {
                            writes: OutputStore::new(),
                            report: Report::failed(FailureDetails::new(
                                &name,
                                EngineError::from_logic(&name, err),
                            )),
                        };
                    }
                };

                let mut writes = OutputStore::new();
                let mut report = Report::default();
                let label = match taken {
                    Some((label, child)) => {
                        debug!(node = %path, branch = label, child = child.name(), "branch taken");
                        let run = self.run_node(child, view, scope).await;
                        writes.merge(run.writes);
                        report.failure = report.absorb(run.report);
                        label
                    }
                    None => "none",
                };
                writes.insert(format!("{name}.branch"), label.into());
                NodeRun { writes, report }
            }
        }
    }
}

fn scope_label(scope: &str) -> &str {
    if scope.is_empty() {
        "<root>"
    } else {
        scope
    }
}
