//! Per-table round state: seating, readiness gates, the turn pointer,
//! authoritative hands, and the finish order.
//!
//! The aggregate is deliberately synchronous and lock-free; the server core
//! wraps exactly one `Round` in an async mutex so every read-modify-write
//! is serialized.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rand::{thread_rng, Rng};
use snafu::Snafu;

use crate::deck::Deck;
use crate::model::{Card, Rank};
use crate::rules::{Rules, WildcardError};

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum RoundError {
    #[snafu(display("seat {} is out of range", seat))]
    SeatOutOfRange { seat: usize },
    #[snafu(display("seat {} is already taken", seat))]
    SeatTaken { seat: usize },
    #[snafu(display("seat {} is not occupied", seat))]
    NotSeated { seat: usize },
    #[snafu(display("action not allowed in the current phase"))]
    WrongPhase,
    #[snafu(display("it is not seat {}'s turn", seat))]
    NotYourTurn { seat: usize },
    #[snafu(display("played cards are not all in hand"))]
    CardsNotHeld,
    #[snafu(display("empty play"))]
    EmptyPlay,
    #[snafu(display("not a valid hand shape"))]
    InvalidShape,
    #[snafu(display("hand does not beat the standing play"))]
    DoesNotBeat,
    #[snafu(display("cannot pass while leading"))]
    PassWhileLeading,
    #[snafu(display("{}", source))]
    BadWildcard { source: WildcardError },
}

/// Table lifecycle. A completed round returns to `ReadyCheck`; a departure
/// after `Seating` fails the in-flight round back to `Seating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Seating,
    ReadyCheck,
    Organizing,
    Playing,
}

/// The hand currently standing on the table.
#[derive(Debug, Clone)]
pub struct LastPlay {
    pub seat: usize,
    pub attempt: Deck,
    pub equivalent: Deck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined { all_joined: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    Waiting,
    /// Hands were dealt; the previous round's finish order rides along for
    /// the start-round payloads before being reset.
    Dealt { previous_finished: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Waiting,
    Begun { leader: usize },
}

#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub equivalent: Deck,
    pub remaining: usize,
    pub seat_finished: bool,
    pub round_over: bool,
    pub next_turn: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub next_turn: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub was_seated: bool,
    pub round_aborted: bool,
}

pub struct Round {
    num_players: usize,
    phase: Phase,
    seats: BTreeMap<usize, String>,
    ready: BTreeSet<usize>,
    started: BTreeSet<usize>,
    hands: Vec<Deck>,
    trump_rank: Rank,
    current: usize,
    last_play: Option<LastPlay>,
    finished: Vec<usize>,
}

impl Round {
    /// Create a table for `num_players` seats. Partnership play needs an
    /// even count of at least two.
    pub fn new(num_players: usize) -> Round {
        assert!(num_players >= 2 && num_players % 2 == 0);
        Round {
            num_players,
            phase: Phase::Seating,
            seats: BTreeMap::new(),
            ready: BTreeSet::new(),
            started: BTreeSet::new(),
            hands: Vec::new(),
            trump_rank: Rank::Two,
            current: 0,
            last_play: None,
            finished: Vec::new(),
        }
    }

    pub fn num_players(&self) -> usize {
        self.num_players
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trump_rank(&self) -> Rank {
        self.trump_rank
    }

    pub fn current_player(&self) -> usize {
        self.current
    }

    pub fn finished(&self) -> &[usize] {
        &self.finished
    }

    pub fn last_play(&self) -> Option<&LastPlay> {
        self.last_play.as_ref()
    }

    pub fn seat_name(&self, seat: usize) -> Option<&str> {
        self.seats.get(&seat).map(String::as_str)
    }

    pub fn hand(&self, seat: usize) -> Option<&Deck> {
        self.hands.get(seat)
    }

    /// Free seat indices, ascending.
    pub fn available_slots(&self) -> Vec<usize> {
        (0..self.num_players)
            .filter(|seat| !self.seats.contains_key(seat))
            .collect()
    }

    pub fn join(&mut self, seat: usize, name: &str) -> Result<JoinOutcome, RoundError> {
        if self.phase != Phase::Seating {
            return WrongPhase.fail();
        }
        if seat >= self.num_players {
            return SeatOutOfRange { seat }.fail();
        }
        if self.seats.contains_key(&seat) {
            return SeatTaken { seat }.fail();
        }
        self.seats.insert(seat, name.to_string());
        let all_joined = self.seats.len() == self.num_players;
        if all_joined {
            self.phase = Phase::ReadyCheck;
        }
        Ok(JoinOutcome::Joined { all_joined })
    }

    pub fn mark_ready(&mut self, seat: usize) -> Result<ReadyOutcome, RoundError> {
        if self.phase != Phase::ReadyCheck {
            return WrongPhase.fail();
        }
        if !self.seats.contains_key(&seat) {
            return NotSeated { seat }.fail();
        }
        self.ready.insert(seat);
        if !self.gate_complete(&self.ready) {
            return Ok(ReadyOutcome::Waiting);
        }
        Ok(ReadyOutcome::Dealt {
            previous_finished: self.deal(),
        })
    }

    pub fn mark_started(&mut self, seat: usize) -> Result<StartOutcome, RoundError> {
        if self.phase != Phase::Organizing {
            return WrongPhase.fail();
        }
        if !self.seats.contains_key(&seat) {
            return NotSeated { seat }.fail();
        }
        self.started.insert(seat);
        if !self.gate_complete(&self.started) {
            return Ok(StartOutcome::Waiting);
        }
        self.started.clear();
        self.phase = Phase::Playing;
        Ok(StartOutcome::Begun {
            leader: self.current,
        })
    }

    /// Check a proposed play without mutating anything. On success, returns
    /// the resolved declared-equivalent cards the comparison ran on.
    pub fn validate_play(
        &self,
        seat: usize,
        attempt: &[Card],
        declared: &[Card],
    ) -> Result<Vec<Card>, RoundError> {
        if self.phase != Phase::Playing {
            return WrongPhase.fail();
        }
        if seat != self.current {
            return NotYourTurn { seat }.fail();
        }
        if attempt.is_empty() {
            return EmptyPlay.fail();
        }
        let hand = self.hands.get(seat).ok_or(RoundError::NotSeated { seat })?;
        if !hand.contains_all(attempt) {
            return CardsNotHeld.fail();
        }
        let rules = Rules::new(self.trump_rank);
        let equivalent = rules
            .resolve_equivalent(attempt, declared)
            .map_err(|source| RoundError::BadWildcard { source })?;
        if !rules.is_play_valid(&equivalent) {
            return InvalidShape.fail();
        }
        if let Some(last) = &self.last_play {
            if last.seat != seat && !rules.is_counter_valid(last.equivalent.cards(), &equivalent) {
                return DoesNotBeat.fail();
            }
        }
        Ok(equivalent)
    }

    /// Validate and apply a play: remove the physical cards from the hand,
    /// record the standing play, detect the seat finishing, and advance the
    /// turn (or end the round).
    pub fn commit_play(
        &mut self,
        seat: usize,
        attempt: &[Card],
        declared: &[Card],
    ) -> Result<PlayOutcome, RoundError> {
        let equivalent = self.validate_play(seat, attempt, declared)?;
        self.hands[seat]
            .remove_many(attempt)
            .map_err(|_| RoundError::CardsNotHeld)?;
        let remaining = self.hands[seat].len();
        let equivalent = Deck::from_cards(equivalent);
        self.last_play = Some(LastPlay {
            seat,
            attempt: Deck::from_cards(attempt.to_vec()),
            equivalent: equivalent.clone(),
        });

        let seat_finished = remaining == 0;
        if seat_finished {
            debug!("seat {} emptied their hand", seat);
            self.finished.push(seat);
        }
        let round_over = self.finished.len() + 1 == self.num_players;
        let next_turn = if round_over {
            self.end_round();
            None
        } else {
            Some(self.advance_turn())
        };
        Ok(PlayOutcome {
            equivalent,
            remaining,
            seat_finished,
            round_over,
            next_turn,
        })
    }

    /// Pass the turn. Legal only as a response to somebody else's standing
    /// hand; the leader must play.
    pub fn pass(&mut self, seat: usize) -> Result<PassOutcome, RoundError> {
        if self.phase != Phase::Playing {
            return WrongPhase.fail();
        }
        if seat != self.current {
            return NotYourTurn { seat }.fail();
        }
        match &self.last_play {
            Some(last) if last.seat != seat => {}
            _ => return PassWhileLeading.fail(),
        }
        Ok(PassOutcome {
            next_turn: self.advance_turn(),
        })
    }

    /// Release a seat. After `Seating`, the in-flight round cannot continue
    /// without the departed seat and is explicitly failed back to `Seating`.
    pub fn leave(&mut self, seat: usize) -> LeaveOutcome {
        if self.seats.remove(&seat).is_none() {
            return LeaveOutcome {
                was_seated: false,
                round_aborted: false,
            };
        }
        self.ready.remove(&seat);
        self.started.remove(&seat);
        let round_aborted = self.phase != Phase::Seating;
        if round_aborted {
            if self.phase == Phase::Playing {
                self.finished.clear();
            }
            self.hands.clear();
            self.last_play = None;
            self.ready.clear();
            self.started.clear();
            self.phase = Phase::Seating;
        }
        LeaveOutcome {
            was_seated: true,
            round_aborted,
        }
    }

    /// A gate is complete when every currently occupied seat is a member
    /// and the table is full. Membership of departed seats is dropped in
    /// `leave`, so a gate can never wait on a ghost.
    fn gate_complete(&self, gate: &BTreeSet<usize>) -> bool {
        self.seats.len() == self.num_players && self.seats.keys().all(|seat| gate.contains(seat))
    }

    fn deal(&mut self) -> Vec<usize> {
        let completed_last_round = self.finished.len() + 1 == self.num_players;
        if completed_last_round {
            self.trump_rank = self.trump_rank.next_natural();
            self.current = self.finished[0];
        } else {
            self.current = thread_rng().gen_range(0, self.num_players);
        }
        let shoe = Deck::deal(self.num_players / 2);
        let mut hands = shoe.split(self.num_players);
        for hand in &mut hands {
            hand.sort(self.trump_rank);
        }
        self.hands = hands;
        self.ready.clear();
        self.last_play = None;
        self.phase = Phase::Organizing;
        debug!(
            "dealt {} hands, trump {}, seat {} to lead",
            self.num_players, self.trump_rank, self.current
        );
        std::mem::replace(&mut self.finished, Vec::new())
    }

    fn end_round(&mut self) {
        self.last_play = None;
        self.started.clear();
        self.phase = Phase::ReadyCheck;
    }

    /// Move the turn pointer to the next seat still holding cards. Passing
    /// the standing hand's owner clears the table so that seat (or, if they
    /// finished, the next unfinished seat) leads afresh.
    fn advance_turn(&mut self) -> usize {
        loop {
            self.current = (self.current + 1) % self.num_players;
            if self.last_play.as_ref().map(|last| last.seat) == Some(self.current) {
                self.last_play = None;
            }
            if !self.finished.contains(&self.current) {
                return self.current;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Suit;

    fn cards(spec: &str) -> Vec<Card> {
        spec.split_whitespace()
            .map(|token| token.parse().unwrap())
            .collect()
    }

    fn full_table() -> Round {
        let mut round = Round::new(4);
        for seat in 0..4 {
            round.join(seat, &format!("p{}", seat)).unwrap();
        }
        round
    }

    fn dealt_table() -> Round {
        let mut round = full_table();
        for seat in 0..4 {
            round.mark_ready(seat).unwrap();
        }
        for seat in 0..4 {
            round.mark_started(seat).unwrap();
        }
        round
    }

    /// Replace a seat's hand for deterministic play tests.
    fn rig_hand(round: &mut Round, seat: usize, spec: &str) {
        round.hands[seat] = spec.parse().unwrap();
    }

    #[test]
    fn seating_fills_then_locks() {
        let mut round = Round::new(4);
        assert_eq!(round.available_slots(), vec![0, 1, 2, 3]);
        assert_eq!(
            round.join(0, "alice").unwrap(),
            JoinOutcome::Joined { all_joined: false }
        );
        assert_eq!(round.join(0, "bob"), Err(RoundError::SeatTaken { seat: 0 }));
        assert_eq!(
            round.join(9, "bob"),
            Err(RoundError::SeatOutOfRange { seat: 9 })
        );
        for seat in 1..3 {
            round.join(seat, "x").unwrap();
        }
        assert_eq!(
            round.join(3, "dana").unwrap(),
            JoinOutcome::Joined { all_joined: true }
        );
        assert_eq!(round.phase(), Phase::ReadyCheck);
        assert!(round.available_slots().is_empty());
        assert_eq!(round.join(3, "late"), Err(RoundError::WrongPhase));
    }

    #[test]
    fn ready_gate_deals_27_cards_each() {
        let mut round = full_table();
        for seat in 0..3 {
            assert_eq!(round.mark_ready(seat).unwrap(), ReadyOutcome::Waiting);
        }
        match round.mark_ready(3).unwrap() {
            ReadyOutcome::Dealt { previous_finished } => assert!(previous_finished.is_empty()),
            other => panic!("expected a deal, got {:?}", other),
        }
        assert_eq!(round.phase(), Phase::Organizing);
        assert_eq!(round.trump_rank(), Rank::Two);
        for seat in 0..4 {
            assert_eq!(round.hand(seat).unwrap().len(), 27);
        }
    }

    #[test]
    fn start_gate_opens_play() {
        let mut round = full_table();
        for seat in 0..4 {
            round.mark_ready(seat).unwrap();
        }
        for seat in 0..3 {
            assert_eq!(round.mark_started(seat).unwrap(), StartOutcome::Waiting);
        }
        match round.mark_started(3).unwrap() {
            StartOutcome::Begun { leader } => assert!(leader < 4),
            other => panic!("expected play to begin, got {:?}", other),
        }
        assert_eq!(round.phase(), Phase::Playing);
    }

    #[test]
    fn out_of_turn_and_foreign_cards_are_rejected() {
        let mut round = dealt_table();
        let leader = round.current_player();
        let off_turn = (leader + 1) % 4;
        let card = round.hand(off_turn).unwrap().cards()[0];
        assert_eq!(
            round.validate_play(off_turn, &[card], &[]),
            Err(RoundError::NotYourTurn { seat: off_turn })
        );

        // A card the leader does not hold.
        rig_hand(&mut round, leader, "3-S 4-S");
        assert_eq!(
            round.validate_play(leader, &cards("K-C"), &[]),
            Err(RoundError::CardsNotHeld)
        );
        assert_eq!(
            round.validate_play(leader, &[], &[]),
            Err(RoundError::EmptyPlay)
        );
    }

    #[test]
    fn play_removes_cards_and_advances() {
        let mut round = dealt_table();
        let leader = round.current_player();
        rig_hand(&mut round, leader, "3-S 9-C");
        let attempt = cards("3-S");
        let outcome = round.commit_play(leader, &attempt, &attempt).unwrap();
        assert_eq!(outcome.remaining, 1);
        assert!(!outcome.seat_finished);
        assert!(!outcome.round_over);
        assert_eq!(outcome.next_turn, Some((leader + 1) % 4));
        assert_eq!(round.hand(leader).unwrap().to_string(), "9-C");
        assert_eq!(round.last_play().unwrap().seat, leader);
    }

    #[test]
    fn standing_hand_must_be_beaten() {
        let mut round = dealt_table();
        let leader = round.current_player();
        let next = (leader + 1) % 4;
        rig_hand(&mut round, leader, "9-S 9-C");
        rig_hand(&mut round, next, "8-S 8-C K-S");
        round
            .commit_play(leader, &cards("9-S 9-C"), &cards("9-S 9-C"))
            .unwrap();
        assert_eq!(
            round.validate_play(next, &cards("8-S 8-C"), &[]),
            Err(RoundError::DoesNotBeat)
        );
        assert_eq!(
            round.validate_play(next, &cards("K-S"), &[]),
            Err(RoundError::DoesNotBeat)
        );
    }

    #[test]
    fn pass_rotates_and_clears_the_table() {
        let mut round = dealt_table();
        let leader = round.current_player();
        rig_hand(&mut round, leader, "3-S 9-C");
        assert_eq!(
            round.pass(leader),
            Err(RoundError::PassWhileLeading)
        );
        let attempt = cards("3-S");
        round.commit_play(leader, &attempt, &attempt).unwrap();
        // Everyone else passes; the table comes back to the leader cleared.
        for _ in 0..3 {
            let seat = round.current_player();
            round.pass(seat).unwrap();
        }
        assert_eq!(round.current_player(), leader);
        assert!(round.last_play().is_none());
        assert_eq!(
            round.pass(leader),
            Err(RoundError::PassWhileLeading)
        );
    }

    #[test]
    fn round_ends_when_one_seat_is_left() {
        let mut round = dealt_table();
        let leader = round.current_player();
        let order: Vec<usize> = (0..4).map(|i| (leader + i) % 4).collect();
        rig_hand(&mut round, order[0], "3-S");
        rig_hand(&mut round, order[1], "4-S");
        rig_hand(&mut round, order[2], "5-S");
        rig_hand(&mut round, order[3], "6-S 7-S");

        let out = round
            .commit_play(order[0], &cards("3-S"), &cards("3-S"))
            .unwrap();
        assert!(out.seat_finished && !out.round_over);
        let out = round
            .commit_play(order[1], &cards("4-S"), &cards("4-S"))
            .unwrap();
        assert!(out.seat_finished && !out.round_over);
        let out = round
            .commit_play(order[2], &cards("5-S"), &cards("5-S"))
            .unwrap();
        assert!(out.seat_finished);
        // Third finisher ends the round; the fourth hand never mattered.
        assert!(out.round_over);
        assert_eq!(out.next_turn, None);
        assert_eq!(round.finished(), &order[..3]);
        assert_eq!(round.phase(), Phase::ReadyCheck);
        assert_eq!(round.hand(order[3]).unwrap().len(), 2);
    }

    #[test]
    fn turn_advance_skips_finished_seats() {
        let mut round = dealt_table();
        let leader = round.current_player();
        let order: Vec<usize> = (0..4).map(|i| (leader + i) % 4).collect();
        rig_hand(&mut round, order[0], "3-S");
        rig_hand(&mut round, order[1], "4-S 4-C");
        rig_hand(&mut round, order[2], "5-S 5-C");
        rig_hand(&mut round, order[3], "6-S 6-C");

        round
            .commit_play(order[0], &cards("3-S"), &cards("3-S"))
            .unwrap();
        // order[1..3] pass; rotation must skip the finished leader and
        // clear the table for order[1].
        round.pass(order[1]).unwrap();
        round.pass(order[2]).unwrap();
        let out = round.pass(order[3]).unwrap();
        assert_eq!(out.next_turn, order[1]);
        assert!(round.last_play().is_none());
    }

    #[test]
    fn next_round_advances_trump_and_hands_lead_to_first_finisher() {
        let mut round = dealt_table();
        let leader = round.current_player();
        let order: Vec<usize> = (0..4).map(|i| (leader + i) % 4).collect();
        rig_hand(&mut round, order[0], "3-S");
        rig_hand(&mut round, order[1], "4-S");
        rig_hand(&mut round, order[2], "5-S");
        rig_hand(&mut round, order[3], "6-S 7-S");
        for i in 0..3 {
            let attempt = round.hand(order[i]).unwrap().cards().to_vec();
            round.commit_play(order[i], &attempt, &attempt).unwrap();
        }

        let mut previous = Vec::new();
        for seat in 0..4 {
            match round.mark_ready(seat).unwrap() {
                ReadyOutcome::Waiting => {}
                ReadyOutcome::Dealt { previous_finished } => previous = previous_finished,
            }
        }
        assert_eq!(previous, order[..3].to_vec());
        assert_eq!(round.trump_rank(), Rank::Three);
        assert_eq!(round.current_player(), order[0]);
        assert!(round.finished().is_empty());
    }

    #[test]
    fn wildcard_play_flows_through_validation() {
        let mut round = dealt_table();
        // Force a known trump for the standing round.
        round.trump_rank = Rank::Two;
        let leader = round.current_player();
        rig_hand(&mut round, leader, "9-S 9-D 2-H 5-C");
        let attempt = cards("9-S 9-D 2-H");
        let declared = cards("9-S 9-D 9-C");
        let outcome = round.commit_play(leader, &attempt, &declared).unwrap();
        assert_eq!(outcome.equivalent.to_string(), "9-S 9-D 9-C");
        assert_eq!(round.hand(leader).unwrap().to_string(), "5-C");
        // The standing comparison uses the declared triple.
        let next = round.current_player();
        rig_hand(&mut round, next, "10-S 10-D 10-C 3-S");
        assert!(round
            .validate_play(next, &cards("10-S 10-D 10-C"), &[])
            .is_ok());
    }

    #[test]
    fn leaving_mid_round_fails_back_to_seating() {
        let mut round = dealt_table();
        let out = round.leave(2);
        assert!(out.was_seated && out.round_aborted);
        assert_eq!(round.phase(), Phase::Seating);
        assert_eq!(round.available_slots(), vec![2]);
        assert!(round.hand(0).is_none());
        assert!(round.finished().is_empty());

        // Reseat and the table readies again from scratch.
        round.join(2, "rejoin").unwrap();
        assert_eq!(round.phase(), Phase::ReadyCheck);
        let out = round.leave(9);
        assert!(!out.was_seated && !out.round_aborted);
    }

    #[test]
    fn ready_gate_ignores_unoccupied_and_wrong_phase() {
        let mut round = Round::new(4);
        round.join(0, "alice").unwrap();
        assert_eq!(round.mark_ready(0), Err(RoundError::WrongPhase));
        let mut round = full_table();
        assert_eq!(
            round.mark_ready(7),
            Err(RoundError::NotSeated { seat: 7 })
        );
        assert_eq!(round.mark_started(0), Err(RoundError::WrongPhase));
    }

    #[test]
    fn duplicate_cards_across_shoes_are_removable() {
        let mut round = dealt_table();
        let leader = round.current_player();
        rig_hand(&mut round, leader, "9-S 9-S 4-C");
        let attempt = vec![
            Card::new(Suit::Spade, Rank::Nine),
            Card::new(Suit::Spade, Rank::Nine),
        ];
        let outcome = round.commit_play(leader, &attempt, &attempt).unwrap();
        assert_eq!(outcome.remaining, 1);
    }
}
