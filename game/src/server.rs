/// The core business logic of the server.
///
/// One `Core` owns one table. Connection tasks register to get a `Context`,
/// feed inbound messages through `Context::execute`, and receive everything
/// addressed to their client on the channel they supplied. In the actual
/// server that channel drains into a WebSocket; in a test, the test holds
/// the receiving half.
use std::collections::BTreeMap;

use futures::channel::mpsc;
use futures::lock::Mutex;
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::deck::Deck;
use crate::protocol::{self, ClientAction, ClientMessage, ServerAction, ServerMessage};
use crate::round::{
    JoinOutcome, PassOutcome, Phase, PlayOutcome, ReadyOutcome, Round, RoundError, StartOutcome,
};

/// The sender half for responses to a client.
pub type ResponseTx = mpsc::UnboundedSender<ServerMessage>;

/// The receiver half for responses to a client.
pub type ResponseRx = mpsc::UnboundedReceiver<ServerMessage>;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seats at the table; partnership play needs an even count.
    pub num_players: usize,
    /// Per-turn deadline before the server passes (or leads) for an absent
    /// player.
    pub turn_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            num_players: 4,
            turn_timeout_secs: 30,
        }
    }
}

/// A freshly started turn. The transport layer arms one deadline per value;
/// `seq` defeats deadlines that outlive their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnStart {
    pub seat: usize,
    pub seq: u64,
}

pub struct Core {
    settings: Settings,
    table: Mutex<Table>,
}

impl Core {
    /// Create a core with an empty table.
    pub fn new(settings: Settings) -> Core {
        Core {
            settings,
            table: Mutex::new(Table {
                round: Round::new(settings.num_players),
                members: BTreeMap::new(),
                turn_seq: 0,
            }),
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Register a new connection with the core.
    ///
    /// The greeting (`availableSlots`) goes out immediately; everything
    /// else is driven by `Context::execute`.
    pub async fn register(&self, response_tx: ResponseTx) -> Context<'_> {
        let slots = {
            let table = self.table.lock().await;
            protocol::encode_slots(&table.round.available_slots())
        };
        let mut context = Context {
            core: self,
            response_tx,
            seat: None,
        };
        context.send(ServerMessage::new(ServerAction::AvailableSlots, slots));
        context
    }

    /// Deadline hook, called by the transport layer when a turn's timer
    /// fires. A stale deadline (the turn already moved on) is a no-op.
    /// Auto-passes for the absent seat, or leads their first card as a
    /// single when passing is illegal.
    pub async fn turn_deadline(&self, turn: TurnStart) -> Option<TurnStart> {
        let mut table = self.table.lock().await;
        if table.turn_seq != turn.seq || table.round.phase() != Phase::Playing {
            return None;
        }
        let seat = table.round.current_player();
        match table.round.pass(seat) {
            Ok(PassOutcome { next_turn }) => {
                info!("seat {} timed out; passing for them", seat);
                Some(table.begin_turn(next_turn))
            }
            Err(RoundError::PassWhileLeading) => {
                let card = match table.round.hand(seat).and_then(|h| h.cards().first().copied()) {
                    Some(card) => card,
                    None => return None,
                };
                info!("seat {} timed out while leading; playing {} for them", seat, card);
                let attempt = [card];
                match table.round.commit_play(seat, &attempt, &attempt) {
                    Ok(outcome) => {
                        finish_play(&mut table, seat, &Deck::from_cards(attempt.to_vec()), outcome)
                    }
                    Err(e) => {
                        error!("auto-play for seat {} failed: {}", seat, e);
                        None
                    }
                }
            }
            Err(e) => {
                debug!("deadline for seat {} no longer applies: {}", seat, e);
                None
            }
        }
    }
}

struct Table {
    round: Round,
    members: BTreeMap<usize, ResponseTx>,
    turn_seq: u64,
}

impl Table {
    /// Fan a message out to every connected seat. A failed send is logged
    /// and skipped; the other members still get their copy.
    fn broadcast(&self, msg: ServerMessage) {
        for (&seat, tx) in self.members.iter() {
            if let Err(e) = tx.unbounded_send(msg.clone()) {
                error!("while broadcasting to seat {}: {}", seat, e);
            }
        }
    }

    fn send_to(&self, seat: usize, msg: ServerMessage) {
        if let Some(tx) = self.members.get(&seat) {
            if let Err(e) = tx.unbounded_send(msg) {
                error!("while sending to seat {}: {}", seat, e);
            }
        }
    }

    fn begin_turn(&mut self, seat: usize) -> TurnStart {
        self.turn_seq += 1;
        self.broadcast(ServerMessage::new(ServerAction::Play, seat.to_string()));
        TurnStart {
            seat,
            seq: self.turn_seq,
        }
    }
}

fn finish_play(
    table: &mut Table,
    seat: usize,
    attempt: &Deck,
    outcome: PlayOutcome,
) -> Option<TurnStart> {
    let data = protocol::encode_last_play(seat, outcome.remaining, attempt, &outcome.equivalent);
    table.broadcast(ServerMessage::new(ServerAction::LastPlay, data));
    if outcome.round_over {
        info!("round over; finish order {:?}", table.round.finished());
        None
    } else {
        outcome.next_turn.map(|next| table.begin_turn(next))
    }
}

/// Rule violations prompt the same seat to retry; everything else is a
/// state-precondition problem that is logged and ignored.
fn is_rule_violation(e: &RoundError) -> bool {
    match e {
        RoundError::CardsNotHeld
        | RoundError::EmptyPlay
        | RoundError::InvalidShape
        | RoundError::DoesNotBeat
        | RoundError::PassWhileLeading
        | RoundError::BadWildcard { .. } => true,
        _ => false,
    }
}

/// The handle by which a connection task drives the core.
pub struct Context<'core> {
    core: &'core Core,
    response_tx: ResponseTx,
    seat: Option<usize>,
}

impl<'core> Context<'core> {
    /// Execute one inbound message. Responses go to the channel supplied at
    /// registration; the return value is the turn that started, if any, so
    /// the caller can arm its deadline.
    pub async fn execute(&mut self, msg: ClientMessage) -> Option<TurnStart> {
        match msg.action {
            ClientAction::Join => self.handle_join(&msg).await,
            ClientAction::Ready => self.handle_ready().await,
            ClientAction::Start => self.handle_start().await,
            ClientAction::PlayAttempt => self.handle_play_attempt(&msg.data).await,
            ClientAction::Play => self.handle_play(&msg.data).await,
            ClientAction::Pass => self.handle_pass().await,
            ClientAction::Tribute | ClientAction::Return => {
                // Card-exchange economics are not in effect yet; accept and
                // log so clients are not disconnected for sending them.
                info!("seat {:?} sent {:?}; no exchange phase to run", self.seat, msg.action);
                None
            }
            ClientAction::Leave => {
                self.depart().await;
                None
            }
        }
    }

    /// Cleanup for this client, e.g. on disconnection.
    pub async fn cleanup(&mut self) {
        self.depart().await;
    }

    fn send(&mut self, msg: ServerMessage) {
        if let Err(e) = self.response_tx.unbounded_send(msg) {
            error!("while sending response: {}", e);
        }
    }

    async fn handle_join(&mut self, msg: &ClientMessage) -> Option<TurnStart> {
        if self.seat.is_some() {
            self.send(ServerMessage::new(ServerAction::Error, "already seated"));
            return None;
        }
        let mut table = self.core.table.lock().await;
        match table.round.join(msg.index, &msg.data) {
            Ok(JoinOutcome::Joined { all_joined }) => {
                self.seat = Some(msg.index);
                table.members.insert(msg.index, self.response_tx.clone());
                info!("'{}' took seat {}", msg.data, msg.index);
                self.send(ServerMessage::new(ServerAction::JoinConfirm, ""));
                if all_joined {
                    info!("all seats taken");
                    table.broadcast(ServerMessage::new(ServerAction::AllJoined, ""));
                }
            }
            Err(e) => {
                debug!("join of seat {} refused: {}", msg.index, e);
                let slots = protocol::encode_slots(&table.round.available_slots());
                self.send(ServerMessage::new(ServerAction::AvailableSlots, slots));
            }
        }
        None
    }

    async fn handle_ready(&mut self) -> Option<TurnStart> {
        let seat = self.seat?;
        let mut table = self.core.table.lock().await;
        match table.round.mark_ready(seat) {
            Ok(ReadyOutcome::Waiting) => {}
            Ok(ReadyOutcome::Dealt { previous_finished }) => {
                let trump = table.round.trump_rank();
                info!("all seats ready; dealing with trump {}", trump);
                for seat in 0..table.round.num_players() {
                    if let Some(hand) = table.round.hand(seat) {
                        let data = protocol::encode_start_round(hand, trump, &previous_finished);
                        table.send_to(seat, ServerMessage::new(ServerAction::StartRound, data));
                    }
                }
            }
            Err(e) => debug!("ready from seat {} ignored: {}", seat, e),
        }
        None
    }

    async fn handle_start(&mut self) -> Option<TurnStart> {
        let seat = self.seat?;
        let mut table = self.core.table.lock().await;
        match table.round.mark_started(seat) {
            Ok(StartOutcome::Waiting) => None,
            Ok(StartOutcome::Begun { leader }) => {
                info!("all hands organized; seat {} leads", leader);
                Some(table.begin_turn(leader))
            }
            Err(e) => {
                debug!("start from seat {} ignored: {}", seat, e);
                None
            }
        }
    }

    async fn handle_play_attempt(&mut self, data: &str) -> Option<TurnStart> {
        let seat = self.seat?;
        let (attempt, _, declared) = match protocol::parse_play(data) {
            Ok(parts) => parts,
            Err(e) => {
                self.send(ServerMessage::new(ServerAction::Error, e.to_string()));
                return None;
            }
        };
        let table = self.core.table.lock().await;
        match table.round.validate_play(seat, attempt.cards(), declared.cards()) {
            Ok(_) => self.send(ServerMessage::new(ServerAction::ValidPlay, "")),
            Err(e) if is_rule_violation(&e) => {
                debug!("invalid attempt from seat {}: {}", seat, e);
                self.send(ServerMessage::new(ServerAction::InvalidPlay, seat.to_string()));
            }
            Err(e) => debug!("attempt from seat {} ignored: {}", seat, e),
        }
        None
    }

    async fn handle_play(&mut self, data: &str) -> Option<TurnStart> {
        let seat = self.seat?;
        let (attempt, _, declared) = match protocol::parse_play(data) {
            Ok(parts) => parts,
            Err(e) => {
                self.send(ServerMessage::new(ServerAction::Error, e.to_string()));
                return None;
            }
        };
        let mut table = self.core.table.lock().await;
        match table.round.commit_play(seat, attempt.cards(), declared.cards()) {
            Ok(outcome) => finish_play(&mut table, seat, &attempt, outcome),
            Err(e) if is_rule_violation(&e) => {
                debug!("invalid play from seat {}: {}", seat, e);
                self.send(ServerMessage::new(ServerAction::InvalidPlay, seat.to_string()));
                None
            }
            Err(e) => {
                debug!("play from seat {} ignored: {}", seat, e);
                None
            }
        }
    }

    async fn handle_pass(&mut self) -> Option<TurnStart> {
        let seat = self.seat?;
        let mut table = self.core.table.lock().await;
        match table.round.pass(seat) {
            Ok(PassOutcome { next_turn }) => Some(table.begin_turn(next_turn)),
            Err(e) if is_rule_violation(&e) => {
                debug!("pass from seat {} refused: {}", seat, e);
                self.send(ServerMessage::new(ServerAction::InvalidPlay, seat.to_string()));
                None
            }
            Err(e) => {
                debug!("pass from seat {} ignored: {}", seat, e);
                None
            }
        }
    }

    async fn depart(&mut self) {
        let seat = match self.seat.take() {
            Some(seat) => seat,
            None => return,
        };
        let mut table = self.core.table.lock().await;
        table.members.remove(&seat);
        let outcome = table.round.leave(seat);
        if outcome.was_seated {
            info!("seat {} left the table", seat);
            table.broadcast(ServerMessage::new(ServerAction::Leave, seat.to_string()));
            let slots = protocol::encode_slots(&table.round.available_slots());
            table.broadcast(ServerMessage::new(ServerAction::AvailableSlots, slots));
            if outcome.round_aborted {
                warn!("round failed: seat {} departed mid-game", seat);
            }
        }
    }
}
