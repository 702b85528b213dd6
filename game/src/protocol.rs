//! The message vocabulary and the opaque payload codecs.
//!
//! The envelope is a small JSON object (serialized by the transport layer);
//! the `data` field is an opaque string whose shape depends on the action.
//! Payload encode/decode pairs here must round-trip exactly.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::deck::Deck;
use crate::model::{ParseError, Rank};

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[snafu(display("expected {} ';'-separated fields", expected))]
    MissingField { expected: usize },
    #[snafu(display("bad number '{}'", text))]
    BadNumber { text: String },
    #[snafu(display("bad card tokens: {}", source))]
    BadCards { source: ParseError },
    #[snafu(display("bad rank token: {}", source))]
    BadRank { source: ParseError },
}

/// Every action a client may send. The wire tag is the camel-cased name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientAction {
    Join,
    Ready,
    Start,
    PlayAttempt,
    Play,
    Pass,
    Tribute,
    Return,
    Leave,
}

/// Every action the server may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerAction {
    AvailableSlots,
    JoinConfirm,
    AllJoined,
    StartRound,
    Play,
    ValidPlay,
    InvalidPlay,
    LastPlay,
    Error,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub index: usize,
    pub action: ClientAction,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub action: ServerAction,
    pub data: String,
}

impl ServerMessage {
    pub fn new(action: ServerAction, data: impl Into<String>) -> ServerMessage {
        ServerMessage {
            action,
            data: data.into(),
        }
    }
}

/// `"<hand-tokens>;<trump-token>;<comma-separated-finished-indices>"`
pub fn encode_start_round(hand: &Deck, trump: Rank, finished: &[usize]) -> String {
    format!("{};{};{}", hand, trump, join_indices(finished, ","))
}

pub fn parse_start_round(data: &str) -> Result<(Deck, Rank, Vec<usize>), ProtocolError> {
    let mut parts = data.splitn(3, ';');
    let hand = next_field(&mut parts, 3)?.parse::<Deck>().context(BadCards)?;
    let trump = next_field(&mut parts, 3)?.parse::<Rank>().context(BadRank)?;
    let finished = parse_indices(next_field(&mut parts, 3)?, ",")?;
    Ok((hand, trump, finished))
}

/// `"<attempt-tokens>;<cards-remaining-after-play>;<equivalent-tokens>"`
pub fn encode_play(attempt: &Deck, remaining: usize, equivalent: &Deck) -> String {
    format!("{};{};{}", attempt, remaining, equivalent)
}

pub fn parse_play(data: &str) -> Result<(Deck, usize, Deck), ProtocolError> {
    let mut parts = data.splitn(3, ';');
    let attempt = next_field(&mut parts, 3)?.parse::<Deck>().context(BadCards)?;
    let remaining = parse_number(next_field(&mut parts, 3)?)?;
    let equivalent = next_field(&mut parts, 3)?.parse::<Deck>().context(BadCards)?;
    Ok((attempt, remaining, equivalent))
}

/// `"<seat>;<cards-remaining>;<attempt-tokens>;<equivalent-tokens>"`
pub fn encode_last_play(seat: usize, remaining: usize, attempt: &Deck, equivalent: &Deck) -> String {
    format!("{};{};{};{}", seat, remaining, attempt, equivalent)
}

pub fn parse_last_play(data: &str) -> Result<(usize, usize, Deck, Deck), ProtocolError> {
    let mut parts = data.splitn(4, ';');
    let seat = parse_number(next_field(&mut parts, 4)?)?;
    let remaining = parse_number(next_field(&mut parts, 4)?)?;
    let attempt = next_field(&mut parts, 4)?.parse::<Deck>().context(BadCards)?;
    let equivalent = next_field(&mut parts, 4)?.parse::<Deck>().context(BadCards)?;
    Ok((seat, remaining, attempt, equivalent))
}

/// Ascending space-separated free seat indices.
pub fn encode_slots(slots: &[usize]) -> String {
    join_indices(slots, " ")
}

pub fn parse_slots(data: &str) -> Result<Vec<usize>, ProtocolError> {
    data.split_whitespace().map(parse_number).collect()
}

fn join_indices(indices: &[usize], sep: &str) -> String {
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn parse_indices(data: &str, sep: &str) -> Result<Vec<usize>, ProtocolError> {
    data.split(sep)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_number)
        .collect()
}

fn parse_number(text: &str) -> Result<usize, ProtocolError> {
    usize::from_str(text.trim()).map_err(|_| ProtocolError::BadNumber {
        text: text.to_string(),
    })
}

fn next_field<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    expected: usize,
) -> Result<&'a str, ProtocolError> {
    parts.next().ok_or(ProtocolError::MissingField { expected })
}
