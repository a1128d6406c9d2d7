//! Job streaming, progress and run-state

use super::Machine;
use crate::run_state::{action_transition, status_transition, RunAction};
use grblstream_core::{ControllerStatus, MachineEvent, RunState, RunTime};
use serde::{Deserialize, Serialize};

/// Bookkeeping for the job being streamed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Name shown to clients
    pub project_name: String,
    /// Start of the current uninterrupted running period, clock ms
    pub start_time: Option<u64>,
    /// Commands acknowledged since the job started
    pub completed_command_count: usize,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            project_name: "Unknown".to_string(),
            start_time: None,
            completed_command_count: 0,
        }
    }
}

impl Machine {
    /// Start streaming `lines` as a job, replacing any queued job lines
    pub fn stream_gcode_lines(&mut self, lines: Vec<String>, project_name: impl Into<String>) {
        let project_name = project_name.into();
        tracing::info!("starting job: {}", project_name);
        tracing::info!("enqueueing {} lines of gcode", lines.len());

        self.queue.load_job(lines);
        self.job.project_name = project_name;
        self.is_running = true;
        self.run_state = RunState::Running;
        self.job.completed_command_count = 0;
        self.echo.clear_sent();
        self.job.start_time = Some(self.now());

        self.report_job_status();
        self.fill_command_buffer();
    }

    /// Feed hold
    pub fn pause(&mut self) {
        self.send_instruction("pause");
        self.apply_action(RunAction::Pause);
    }

    /// Cycle start
    pub fn resume(&mut self) {
        self.send_instruction("resume");
        self.apply_action(RunAction::Resume);
    }

    fn apply_action(&mut self, action: RunAction) {
        if let Some(next) = action_transition(self.run_state, action) {
            self.enter_run_state(next);
        }
    }

    pub(super) fn apply_status(&mut self, status: ControllerStatus) {
        if let Some(next) = status_transition(self.run_state, status) {
            self.enter_run_state(next);
        }
    }

    fn enter_run_state(&mut self, next: RunState) {
        tracing::debug!("run-state {} -> {}", self.run_state, next);
        if self.is_running && self.run_state == RunState::Running {
            self.report_run_time();
        } else if self.is_running && next == RunState::Running {
            self.job.start_time = Some(self.now());
        }
        self.run_state = next;

        match next {
            RunState::Pausing | RunState::Paused | RunState::PausedDoorOpen => {
                self.events
                    .publish(MachineEvent::Paused(self.percent_complete()));
            }
            RunState::Resuming | RunState::Running => {
                self.fill_command_buffer();
                self.events
                    .publish(MachineEvent::Resumed(self.percent_complete()));
            }
        }
    }

    /// Share of the job acknowledged so far, 0 to 100. Zero when nothing has
    /// been queued.
    pub fn percent_complete(&self) -> f64 {
        let completed = self.job.completed_command_count;
        let total = completed + self.queue.unprocessed_count();
        if total == 0 {
            return 0.0;
        }
        completed as f64 / total as f64 * 100.0
    }

    /// The controller acknowledged the oldest in-flight command
    pub(super) fn on_process_command(&mut self) {
        self.last_run_command = self.queue.acknowledge();
        self.job.completed_command_count += 1;
        self.fill_command_buffer();

        self.report_job_status_and_run_time();
    }

    /// Report progress while running; close out the job once everything
    /// has been acknowledged.
    pub(super) fn report_job_status_and_run_time(&mut self) {
        if self.is_running && self.run_state == RunState::Running {
            self.report_job_status();
            if self.queue.unprocessed_count() == 0 {
                tracing::info!("Job complete: {}", self.job.project_name);
                self.is_running = false;
                self.report_run_time();
            }
        }
    }

    /// Publish the current job status: run-state plus progress while a job
    /// runs, otherwise whichever of stopping, uploading or ready applies.
    pub fn report_job_status(&mut self) {
        if self.is_running {
            self.events.publish(MachineEvent::RunState(self.run_state));
            let percent = self.percent_complete();
            if self.run_state.is_paused() {
                self.events.publish(MachineEvent::Paused(percent));
            } else {
                self.events.publish(MachineEvent::Running(percent));
            }
        } else if self.is_stopping {
            self.events.publish(MachineEvent::Stopping);
        } else if self.is_uploading_firmware {
            self.events.publish(MachineEvent::UploadingFirmware);
        } else if self.is_machine_connected {
            self.events.publish(MachineEvent::Ready);
        }
    }

    /// Publish the running period that just ended, at most once per period
    pub(super) fn report_run_time(&mut self) {
        if let Some(start) = self.job.start_time.take() {
            let end = self.now();
            tracing::debug!("run-time {}..{}", start, end);
            self.events.publish(MachineEvent::RunTime(RunTime { start, end }));
        }
    }

    /// Current run-state
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Whether a job is streaming
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Whether a staged stop is in progress
    pub fn is_stopping(&self) -> bool {
        self.is_stopping
    }

    /// Name of the current or most recent job
    pub fn project_name(&self) -> &str {
        &self.job.project_name
    }

    /// Job bookkeeping
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// The last command the controller acknowledged
    pub fn last_run_command(&self) -> Option<&str> {
        self.last_run_command.as_deref()
    }
}
