// src/models/protocol.rs

//! Wire format of the duel socket.
//!
//! Every frame is a JSON text message shaped `{"event": "...", "data": {...}}`
//! with camelCase field names.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::{
    error::ChallengeError,
    models::{
        challenge::DeclineReason,
        question::PublicQuestion,
        result::DuelResult,
        room::{RoomSnapshot, RoomStatus, Standing},
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    pub user_id: String,
    #[validate(length(min = 1, max = 64))]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengePayload {
    #[validate(length(min = 1, max = 128))]
    pub challenger_id: String,
    #[validate(length(min = 1, max = 128))]
    pub challenged_id: String,
    #[validate(length(min = 1, max = 128))]
    pub course_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDecisionPayload {
    #[validate(length(min = 1, max = 64))]
    pub challenge_id: String,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinChallengePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 100))]
    pub question_id: String,
    pub answer: usize,
    /// Seconds the client spent on the question.
    #[serde(default)]
    pub time_spent: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    /// Informational only; seats are looked up by user id.
    #[serde(default)]
    pub is_challenger: bool,
    #[validate(length(max = 500))]
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRoomPayload {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoomQueryPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
}

/// Events sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Identify(IdentifyPayload),
    CreateChallengeRoom(CreateChallengePayload),
    AcceptChallenge(ChallengeDecisionPayload),
    DeclineChallenge(ChallengeDecisionPayload),
    JoinChallenge(JoinChallengePayload),
    SubmitAnswer(SubmitAnswerPayload),
    LeaveRoom(LeaveRoomPayload),
    CheckInRoom(CheckInRoomPayload),
    GetRoomState(RoomQueryPayload),
    GetResult(RoomQueryPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Identify(_) => "identify",
            ClientEvent::CreateChallengeRoom(_) => "create_challenge_room",
            ClientEvent::AcceptChallenge(_) => "accept_challenge",
            ClientEvent::DeclineChallenge(_) => "decline_challenge",
            ClientEvent::JoinChallenge(_) => "join_challenge",
            ClientEvent::SubmitAnswer(_) => "submit_answer",
            ClientEvent::LeaveRoom(_) => "leave_room",
            ClientEvent::CheckInRoom(_) => "check_in_room",
            ClientEvent::GetRoomState(_) => "get_room_state",
            ClientEvent::GetResult(_) => "get_result",
        }
    }

    /// Field-level validation of the payload.
    /// `identify` is validated by the registry so a bad id stays a soft no-op.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ClientEvent::Identify(p) => p.validate(),
            ClientEvent::CreateChallengeRoom(p) => p.validate(),
            ClientEvent::AcceptChallenge(p) | ClientEvent::DeclineChallenge(p) => p.validate(),
            ClientEvent::JoinChallenge(p) => p.validate(),
            ClientEvent::SubmitAnswer(p) => p.validate(),
            ClientEvent::LeaveRoom(p) => p.validate(),
            ClientEvent::CheckInRoom(p) => p.validate(),
            ClientEvent::GetRoomState(p) | ClientEvent::GetResult(p) => p.validate(),
        }
    }
}

/// Events pushed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Identified { user_id: String, user_name: String },

    #[serde(rename_all = "camelCase")]
    ChallengeCreated { challenge_id: String, room_id: String },

    #[serde(rename_all = "camelCase")]
    ChallengeReceived {
        challenge_id: String,
        room_id: String,
        challenger_id: String,
        challenger_name: String,
        course_id: String,
        course_name: String,
    },

    #[serde(rename_all = "camelCase")]
    ChallengeAccepted {
        challenge_id: String,
        room_id: String,
        user_id: String,
        user_name: String,
    },

    #[serde(rename_all = "camelCase")]
    ChallengeDeclined {
        challenge_id: String,
        room_id: String,
        user_id: String,
        user_name: String,
        reason: DeclineReason,
    },

    /// The room could not be started (question generation failed).
    #[serde(rename_all = "camelCase")]
    ChallengeCancelled { room_id: String, reason: String },

    #[serde(rename_all = "camelCase")]
    ChallengeStarted {
        room: RoomSnapshot,
        total_questions: usize,
        first_time_limit: u32,
    },

    #[serde(rename_all = "camelCase")]
    NewQuestion {
        room_id: String,
        question: PublicQuestion,
        question_number: usize,
        total_questions: usize,
        time_limit: u32,
    },

    #[serde(rename_all = "camelCase")]
    AnswerSubmitted {
        room_id: String,
        user_id: String,
        question_number: usize,
    },

    #[serde(rename_all = "camelCase")]
    BothAnswered {
        room_id: String,
        question_number: usize,
        timed_out: bool,
        standings: Vec<Standing>,
    },

    #[serde(rename_all = "camelCase")]
    TimeSync {
        room_id: String,
        question_number: usize,
        time_left: u64,
    },

    ChallengeResults(DuelResult),

    /// The result was delivered but could not be stored.
    #[serde(rename_all = "camelCase")]
    ResultWarning { room_id: String, message: String },

    #[serde(rename_all = "camelCase")]
    OpponentDisconnected {
        room_id: String,
        user_id: String,
        grace_seconds: u64,
    },

    #[serde(rename_all = "camelCase")]
    OpponentReconnected { room_id: String, user_id: String },

    #[serde(rename_all = "camelCase")]
    OpponentLeft {
        room_id: String,
        user_id: String,
        user_name: String,
        custom_message: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    LeftRoom { room_id: String },

    #[serde(rename_all = "camelCase")]
    InRoomResponse {
        in_room: bool,
        room_id: Option<String>,
        status: Option<RoomStatus>,
    },

    RoomState(RoomSnapshot),

    Error {
        code: String,
        message: String,
        event: Option<String>,
    },
}

impl ServerEvent {
    pub fn error(err: &ChallengeError, event: Option<&str>) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            event: event.map(str::to_string),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Identified { .. } => "identified",
            ServerEvent::ChallengeCreated { .. } => "challenge_created",
            ServerEvent::ChallengeReceived { .. } => "challenge_received",
            ServerEvent::ChallengeAccepted { .. } => "challenge_accepted",
            ServerEvent::ChallengeDeclined { .. } => "challenge_declined",
            ServerEvent::ChallengeCancelled { .. } => "challenge_cancelled",
            ServerEvent::ChallengeStarted { .. } => "challenge_started",
            ServerEvent::NewQuestion { .. } => "new_question",
            ServerEvent::AnswerSubmitted { .. } => "answer_submitted",
            ServerEvent::BothAnswered { .. } => "both_answered",
            ServerEvent::TimeSync { .. } => "time_sync",
            ServerEvent::ChallengeResults(_) => "challenge_results",
            ServerEvent::ResultWarning { .. } => "result_warning",
            ServerEvent::OpponentDisconnected { .. } => "opponent_disconnected",
            ServerEvent::OpponentReconnected { .. } => "opponent_reconnected",
            ServerEvent::OpponentLeft { .. } => "opponent_left",
            ServerEvent::LeftRoom { .. } => "left_room",
            ServerEvent::InRoomResponse { .. } => "in_room_response",
            ServerEvent::RoomState(_) => "room_state",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_submit_answer() {
        let raw = json!({
            "event": "submit_answer",
            "data": {
                "roomId": "r1",
                "userId": "alice",
                "questionId": "q1",
                "answer": 2,
                "timeSpent": 3.5
            }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        match event {
            ClientEvent::SubmitAnswer(p) => {
                assert_eq!(p.answer, 2);
                assert_eq!(p.time_spent, 3.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn leave_room_message_is_optional() {
        let raw = json!({
            "event": "leave_room",
            "data": { "roomId": "r1", "userId": "bob", "isChallenger": false }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.name(), "leave_room");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn empty_ids_fail_validation() {
        let raw = json!({
            "event": "create_challenge_room",
            "data": { "challengerId": "", "challengedId": "bob", "courseId": "c" }
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert!(event.validate().is_err());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let raw = json!({ "event": "drop_tables", "data": {} });
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn outbound_envelope_shape() {
        let event = ServerEvent::TimeSync {
            room_id: "r1".into(),
            question_number: 2,
            time_left: 7,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(value["data"]["timeLeft"], 7);
        assert_eq!(value["data"]["questionNumber"], 2);
    }

    #[test]
    fn error_event_carries_reason_code() {
        let event = ServerEvent::error(&ChallengeError::StaleQuestion, Some("submit_answer"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["code"], "stale_question");
        assert_eq!(value["data"]["event"], "submit_answer");
    }
}
