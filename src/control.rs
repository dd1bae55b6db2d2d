//! Command surface for operators and upstream systems.
//!
//! Thin wrapper over the command mailbox pairs: each call clears the stale
//! ack, posts the request, and waits for the machine's answer with a
//! timeout. A timeout means the supervisor never answered, which is reported
//! as a rejection, never silently dropped.

use std::sync::Arc;

use crate::error::ErrorMessage;
use crate::events::{Ack, Events, ModeRequest, StartMissionRequest};
use crate::mailbox::Mailbox;
use crate::models::{Mission, MissionId, Pose};

#[derive(Clone)]
pub struct SupervisorHandle {
    events: Arc<Events>,
    ack_timeout: std::time::Duration,
}

impl SupervisorHandle {
    pub fn new(events: Arc<Events>, ack_timeout: std::time::Duration) -> Self {
        Self {
            events,
            ack_timeout,
        }
    }

    async fn request<T>(&self, command: &Mailbox<T>, payload: T, ack: &Mailbox<Ack>) -> Ack {
        ack.clear();
        command.trigger(payload);
        match ack.consume(self.ack_timeout).await {
            Ok(ack) => ack,
            Err(_) => Ack::Rejected(ErrorMessage::communication_timeout(
                "supervisor did not answer in time",
            )),
        }
    }

    pub async fn start_mission(&self, mission: Mission, initial_pose: Option<Pose>) -> Ack {
        self.request(
            &self.events.start_mission,
            StartMissionRequest {
                mission,
                initial_pose,
            },
            &self.events.start_mission_ack,
        )
        .await
    }

    /// Stop the active mission. With a mission id, the stop only applies if
    /// the id matches the active mission; `None` stops whatever is running.
    pub async fn stop_mission(&self, mission_id: Option<MissionId>) -> Ack {
        self.request(
            &self.events.stop_mission,
            mission_id,
            &self.events.stop_mission_ack,
        )
        .await
    }

    pub async fn pause_mission(&self) -> Ack {
        self.request(&self.events.pause_mission, (), &self.events.pause_mission_ack)
            .await
    }

    pub async fn resume_mission(&self) -> Ack {
        self.request(
            &self.events.resume_mission,
            (),
            &self.events.resume_mission_ack,
        )
        .await
    }

    pub async fn return_home(&self) -> Ack {
        self.request(&self.events.return_home, (), &self.events.return_home_ack)
            .await
    }

    pub async fn release_intervention(&self) -> Ack {
        self.request(
            &self.events.release_intervention,
            (),
            &self.events.release_intervention_ack,
        )
        .await
    }

    pub async fn set_maintenance_mode(&self, request: ModeRequest) -> Ack {
        self.request(
            &self.events.maintenance_mode,
            request,
            &self.events.maintenance_mode_ack,
        )
        .await
    }

    pub async fn send_to_lockdown(&self, request: ModeRequest) -> Ack {
        self.request(&self.events.lockdown, request, &self.events.lockdown_ack)
            .await
    }

    /// Name of the state the machine is currently in, if it has published
    /// one yet.
    pub fn get_state(&self) -> Option<&'static str> {
        self.events.current_state.check()
    }
}
