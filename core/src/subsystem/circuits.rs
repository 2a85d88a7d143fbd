// Circuits subsystem: troubleshooting sessions ("wtf" circuits)
use serde_json::{json, Value};

use super::SubsystemClient;
use crate::channel::{ChannelName, ChannelRegistry};
use crate::correlation::PendingReply;
use crate::Result;

/// Request types understood by the counterpart on the circuits channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitRequest {
    LoadActiveCircuit,
    StartWtf,
    JoinWtf,
    LeaveWtf,
    SolveWtf,
    CancelWtf,
    PauseWtf,
    ResumeWtf,
    GetCircuitWithAllDetails,
    GetAllMyParticipatingCircuits,
}

impl CircuitRequest {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitRequest::LoadActiveCircuit => "load-active-circuit",
            CircuitRequest::StartWtf => "start-wtf",
            CircuitRequest::JoinWtf => "join-wtf",
            CircuitRequest::LeaveWtf => "leave-wtf",
            CircuitRequest::SolveWtf => "solve-wtf",
            CircuitRequest::CancelWtf => "cancel-wtf",
            CircuitRequest::PauseWtf => "pause-wtf",
            CircuitRequest::ResumeWtf => "resume-wtf",
            CircuitRequest::GetCircuitWithAllDetails => "get-circuit-with-all-details",
            CircuitRequest::GetAllMyParticipatingCircuits => "get-all-my-participating-circuits",
        }
    }
}

pub struct CircuitClient {
    inner: SubsystemClient,
}

impl CircuitClient {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            inner: SubsystemClient::new(ChannelName::Circuits, owner),
        }
    }

    pub fn init(&self, channels: &ChannelRegistry) -> Result<()> {
        self.inner.init(channels)
    }

    pub fn subsystem(&self) -> &SubsystemClient {
        &self.inner
    }

    fn send(&self, request: CircuitRequest, payload: Value) -> Result<PendingReply> {
        self.inner.request(request.as_str(), payload)
    }

    pub fn load_active_circuit(&self) -> Result<PendingReply> {
        self.send(CircuitRequest::LoadActiveCircuit, json!({}))
    }

    pub fn start_wtf(&self) -> Result<PendingReply> {
        self.send(CircuitRequest::StartWtf, json!({}))
    }

    pub fn join_wtf(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(CircuitRequest::JoinWtf, json!({ "circuitName": circuit_name }))
    }

    pub fn leave_wtf(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(CircuitRequest::LeaveWtf, json!({ "circuitName": circuit_name }))
    }

    pub fn solve_wtf(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(CircuitRequest::SolveWtf, json!({ "circuitName": circuit_name }))
    }

    pub fn cancel_wtf(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(CircuitRequest::CancelWtf, json!({ "circuitName": circuit_name }))
    }

    pub fn pause_wtf(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(CircuitRequest::PauseWtf, json!({ "circuitName": circuit_name }))
    }

    pub fn resume_wtf(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(CircuitRequest::ResumeWtf, json!({ "circuitName": circuit_name }))
    }

    pub fn get_circuit_with_all_details(&self, circuit_name: &str) -> Result<PendingReply> {
        self.send(
            CircuitRequest::GetCircuitWithAllDetails,
            json!({ "circuitName": circuit_name }),
        )
    }

    pub fn get_all_my_participating_circuits(&self) -> Result<PendingReply> {
        self.send(CircuitRequest::GetAllMyParticipatingCircuits, json!({}))
    }
}
