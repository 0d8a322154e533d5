use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::registry::UserId;

#[derive(Debug, Deserialize, Validate)]
pub struct RoomJoinPayload {
    #[validate(length(min = 1, max = 128))]
    #[serde(rename = "roomId")]
    pub room_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoomLeavePayload {
    #[validate(length(min = 1, max = 128))]
    #[serde(rename = "roomId")]
    pub room_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatTakePayload {
    #[validate(range(min = 0, max = 14))]
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatLeavePayload {}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatAssignPayload {
    #[validate(range(min = 0, max = 14))]
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
    #[serde(rename = "targetUserId")]
    pub target_user_id: UserId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatMutePayload {
    #[validate(range(min = 0, max = 14))]
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
    pub muted: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatLockPayload {
    #[validate(range(min = 0, max = 14))]
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatInvitePayload {
    #[validate(range(min = 0, max = 14))]
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
    #[serde(rename = "targetUserId")]
    pub target_user_id: UserId,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatInviteResponsePayload {
    #[validate(range(min = 0, max = 14))]
    #[serde(rename = "seatIndex")]
    pub seat_index: u8,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransportCreatePayload {
    #[validate(length(min = 1))]
    pub role: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransportConnectPayload {
    #[validate(length(min = 1))]
    #[serde(rename = "transportId")]
    pub transport_id: String,
    #[serde(rename = "dtlsParameters")]
    pub dtls_parameters: Value,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AudioProducePayload {
    #[validate(length(min = 1))]
    #[serde(rename = "transportId")]
    pub transport_id: String,
    #[serde(rename = "rtpParameters")]
    pub rtp_parameters: Value,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AudioConsumePayload {
    #[validate(length(min = 1))]
    #[serde(rename = "transportId")]
    pub transport_id: String,
    #[validate(length(min = 1))]
    #[serde(rename = "producerId")]
    pub producer_id: String,
    #[serde(rename = "rtpCapabilities")]
    pub rtp_capabilities: Value,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConsumerResumePayload {
    #[validate(length(min = 1))]
    #[serde(rename = "consumerId")]
    pub consumer_id: String,
}
