//! Staged stop
//!
//! Aborting a job cannot be done in one write: the controller is held, its
//! buffer flushed, released, and only then can the tool be lifted and parked.
//! Each stage waits `stop_stage_delay` for the previous one to settle. Once
//! started the sequence always runs to the end.

use super::{Machine, TimerKind};
use grblstream_core::MachineEvent;
use serde::Serialize;

/// Stage of a stop that runs when its timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopStage {
    /// Soft-reset the controller, discarding its planner buffer
    Flush,
    /// Release the feed hold
    Resume,
    /// Lift, stop the spindle and park
    Park,
}

impl Machine {
    /// Abort the running job. Does nothing when no job runs.
    pub fn stop(&mut self) {
        if !self.is_running {
            return;
        }

        tracing::info!("Stopping job: {}", self.job.project_name);
        self.is_stopping = true;
        self.events.publish(MachineEvent::Stopping);
        self.reset();
        self.send_instruction("pause");
        self.schedule_stop_stage(StopStage::Flush);
    }

    fn schedule_stop_stage(&mut self, stage: StopStage) {
        let delay = self.timings.stop_stage_delay();
        self.schedule(delay, TimerKind::Stop(stage));
    }

    pub(super) fn advance_stop(&mut self, stage: StopStage) {
        tracing::debug!("Stop stage {:?}", stage);
        match stage {
            StopStage::Flush => {
                self.send_instruction("flush");
                self.schedule_stop_stage(StopStage::Resume);
            }
            StopStage::Resume => {
                self.send_instruction("resume");
                self.schedule_stop_stage(StopStage::Park);
            }
            StopStage::Park => {
                let custom_lift = self
                    .config
                    .as_ref()
                    .and_then(|config| config.lift_to_custom_safety_height.clone())
                    .filter(|line| !line.is_empty());
                match custom_lift {
                    Some(line) => self.send_line(&line),
                    None => self.send_instruction("liftToSafeHeight"),
                }
                self.send_instruction("spindleOff");
                self.send_instruction("park");

                self.is_stopping = false;
                self.report_job_status();
            }
        }
    }
}
