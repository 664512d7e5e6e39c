// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless scenario runner.
//!
//! Plays a script against a session, advancing simulated time through a
//! [`SimulationClock`], and records what every token did.

use crate::clock::SimulationClock;
use crate::project::{ProjectSettings, SimulationSettings};
use crate::script::ScriptStep;
use blockflow_graph::{BlockId, FlowEvent, Session, SessionError, TokenFate, TokenId};
use indexmap::IndexMap;

/// What one token did
#[derive(Debug, Clone, PartialEq)]
pub struct TokenReport {
    /// Label of the block it was spawned on
    pub source: String,
    /// Labels of the blocks it visited, in order
    pub path: Vec<String>,
    /// Value after each visit
    pub values: Vec<f32>,
    /// How it ended, if it did
    pub fate: Option<TokenFate>,
}

/// Outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Tokens in spawn order
    pub tokens: IndexMap<TokenId, TokenReport>,
    /// Interaction state changes seen
    pub transitions: usize,
    /// Fixed steps run
    pub steps: u64,
    /// Simulated seconds elapsed
    pub elapsed: f64,
    /// Tokens still in flight when the settle timeout ran out
    pub unsettled: usize,
}

/// Plays scripts against a session
pub struct ScenarioRunner {
    session: Session,
    clock: SimulationClock,
    settle_timeout: f64,
    report: RunReport,
}

impl ScenarioRunner {
    /// Create a runner for an existing session
    pub fn new(session: Session, simulation: &SimulationSettings) -> Self {
        let mut clock = SimulationClock::new(simulation.fixed_timestep);
        clock.set_time_scale(simulation.time_scale);
        Self {
            session,
            clock,
            settle_timeout: simulation.settle_timeout,
            report: RunReport::default(),
        }
    }

    /// Create a runner for a project's session
    pub fn from_project(project: &ProjectSettings) -> Result<Self, SessionError> {
        Ok(Self::new(project.build_session()?, &project.simulation))
    }

    /// Run a whole script, then wait for tokens to finish
    pub fn run(mut self, script: &[ScriptStep]) -> Result<RunReport, RunError> {
        self.clock.play();
        for (index, step) in script.iter().enumerate() {
            self.step(index, step)?;
        }
        self.settle();
        self.clock.stop();
        Ok(self.report)
    }

    /// Execute one step
    pub fn step(&mut self, index: usize, step: &ScriptStep) -> Result<(), RunError> {
        tracing::debug!(index, %step, "script step");
        let fail = |source: SessionError| RunError::Step {
            index,
            step: step.to_string(),
            source,
        };

        match step {
            ScriptStep::Wait { seconds } => {
                if !seconds.is_finite() || *seconds < 0.0 {
                    return Err(RunError::InvalidWait {
                        index,
                        seconds: *seconds,
                    });
                }
                self.advance(*seconds);
            }
            ScriptStep::Interact { block, at } => {
                let id = self.resolve(index, block)?;
                if self.session.interact(id, *at).map_err(fail)?.is_none() {
                    tracing::debug!(%block, "gesture ignored");
                }
            }
            ScriptStep::DragTo { at } => {
                if self.session.dragged().is_none() {
                    tracing::debug!("nothing to drag");
                }
                self.session.drag_to(*at);
            }
            ScriptStep::Return { block } => {
                let id = self.resolve(index, block)?;
                self.session.return_to_palette(id).map_err(fail)?;
            }
            ScriptStep::Trigger => {
                self.session.trigger_source().map_err(fail)?;
            }
            ScriptStep::SetInput { value } => {
                let source = self.session.source().ok_or(SessionError::NoSource).map_err(fail)?;
                self.session.set_value(source, *value).map_err(fail)?;
            }
            ScriptStep::Remove { block } => {
                let id = self.resolve(index, block)?;
                self.session.remove_block(id).map_err(fail)?;
            }
            ScriptStep::ClearTokens => {
                self.session.clear_tokens();
            }
        }

        self.collect_events();
        Ok(())
    }

    fn resolve(&self, index: usize, label: &str) -> Result<BlockId, RunError> {
        self.session
            .find_block(label)
            .ok_or_else(|| RunError::UnknownLabel {
                index,
                label: label.to_string(),
            })
    }

    /// Advance simulated time in frames of one fixed timestep each
    fn advance(&mut self, seconds: f64) {
        let frame = self.clock.fixed_timestep();
        let frames = (seconds / frame).round().max(0.0) as u64;
        for _ in 0..frames {
            self.frame(frame);
        }
    }

    fn frame(&mut self, delta: f64) {
        let steps = self.clock.update(delta);
        for _ in 0..steps {
            self.session.tick(self.clock.fixed_timestep() as f32);
        }
        self.collect_events();
    }

    /// Tick until every token is gone or the timeout runs out
    fn settle(&mut self) {
        let frame = self.clock.fixed_timestep();
        let mut waited = 0.0;
        while !self.session.engine().is_empty() && waited < self.settle_timeout {
            self.frame(frame);
            waited += frame;
        }

        self.report.unsettled = self.session.engine().len();
        if self.report.unsettled > 0 {
            tracing::warn!(tokens = self.report.unsettled, "tokens still in flight after settle timeout");
        }
        self.report.steps = self.clock.step_count;
        self.report.elapsed = self.clock.elapsed_time;
    }

    fn label(&self, block: BlockId) -> String {
        self.session
            .block(block)
            .map_or_else(|| block.to_string(), |b| b.label.clone())
    }

    fn collect_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                FlowEvent::TokenSpawned { token, block, value } => {
                    let source = self.label(block);
                    tracing::info!(%token, %source, value, "token spawned");
                    self.report.tokens.insert(
                        token,
                        TokenReport {
                            source,
                            path: Vec::new(),
                            values: Vec::new(),
                            fate: None,
                        },
                    );
                }
                FlowEvent::BlockVisited { token, block, value } => {
                    let label = self.label(block);
                    tracing::info!(%token, block = %label, value, "block visited");
                    if let Some(report) = self.report.tokens.get_mut(&token) {
                        report.path.push(label);
                        report.values.push(value);
                    }
                }
                FlowEvent::TokenDestroyed { token, fate } => {
                    tracing::info!(%token, ?fate, "token destroyed");
                    if let Some(report) = self.report.tokens.get_mut(&token) {
                        report.fate = Some(fate);
                    }
                }
                FlowEvent::StateChanged { block, from, to } => {
                    tracing::info!(block = %self.label(block), %from, %to, "state changed");
                    self.report.transitions += 1;
                }
            }
        }
    }
}

/// Error while running a script
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// No block carries the label
    #[error("Step {index}: no block labelled {label:?}")]
    UnknownLabel {
        /// Step index
        index: usize,
        /// Missing label
        label: String,
    },

    /// Wait duration is negative, infinite or NaN
    #[error("Step {index}: cannot wait {seconds} seconds")]
    InvalidWait {
        /// Step index
        index: usize,
        /// Requested duration
        seconds: f64,
    },

    /// The session rejected the step
    #[error("Step {index} ({step}) failed: {source}")]
    Step {
        /// Step index
        index: usize,
        /// Step description
        step: String,
        /// Cause
        source: SessionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_scenario() {
        let project = ProjectSettings::default();
        let runner = ScenarioRunner::from_project(&project).unwrap();
        let report = runner.run(&project.script).unwrap();

        assert_eq!(report.unsettled, 0);
        let tokens: Vec<_> = report.tokens.values().collect();
        assert_eq!(tokens.len(), 2);

        assert_eq!(tokens[0].source, "input0");
        assert_eq!(tokens[0].path, vec!["add0", "multiply0", "output0"]);
        assert_eq!(tokens[0].values, vec![4.0, 8.0, 8.0]);
        assert_eq!(tokens[0].fate, Some(TokenFate::Completed { value: 8.0 }));

        // add0 went back to the palette and the chain healed around it
        assert_eq!(tokens[1].path, vec!["multiply0", "output0"]);
        assert_eq!(tokens[1].fate, Some(TokenFate::Completed { value: 6.0 }));

        // pick + splice for two blocks, then one return
        assert_eq!(report.transitions, 5);
    }

    #[test]
    fn test_unknown_label() {
        let project = ProjectSettings::default();
        let runner = ScenarioRunner::from_project(&project).unwrap();
        let script = [ScriptStep::Return {
            block: "nope".into(),
        }];
        assert!(matches!(
            runner.run(&script),
            Err(RunError::UnknownLabel { index: 0, .. })
        ));
    }

    #[test]
    fn test_dangling_chain() {
        let project = ProjectSettings::default();
        let runner = ScenarioRunner::from_project(&project).unwrap();
        let script = [
            ScriptStep::Remove {
                block: "output0".into(),
            },
            ScriptStep::Trigger,
        ];
        let report = runner.run(&script).unwrap();
        let token = report.tokens.values().next().unwrap();
        assert!(token.path.is_empty());
        assert_eq!(token.fate, Some(TokenFate::Dangling { value: 1.0 }));
    }

    #[test]
    fn test_rejects_unbounded_waits() {
        let project = ProjectSettings::default();
        for seconds in [f64::INFINITY, f64::NAN, -1.0] {
            let runner = ScenarioRunner::from_project(&project).unwrap();
            let script = [ScriptStep::Trigger, ScriptStep::Wait { seconds }];
            assert!(matches!(
                runner.run(&script),
                Err(RunError::InvalidWait { index: 1, .. })
            ));
        }
    }

    #[test]
    fn test_clear_tokens_strands_in_flight() {
        let project = ProjectSettings::default();
        let runner = ScenarioRunner::from_project(&project).unwrap();
        let script = [ScriptStep::Trigger, ScriptStep::Trigger, ScriptStep::ClearTokens];
        let report = runner.run(&script).unwrap();

        assert_eq!(report.unsettled, 0);
        assert_eq!(report.tokens.len(), 2);
        for token in report.tokens.values() {
            assert!(token.path.is_empty());
            assert_eq!(token.fate, Some(TokenFate::Stranded));
        }
    }

    #[test]
    fn test_wait_advances_clock() {
        let project = ProjectSettings::default();
        let runner = ScenarioRunner::from_project(&project).unwrap();
        let report = runner.run(&[ScriptStep::Wait { seconds: 1.0 }]).unwrap();
        assert!((report.elapsed - 1.0).abs() < 1e-6);
        assert!(report.steps >= 59);
    }
}
