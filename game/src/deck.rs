//! An ordered, mutable multiset of cards.
//!
//! The same type backs the full shoe before dealing, a player's hand, and
//! an in-flight play. Index-based reorder operations exist for the
//! organizing phase; removal by value is what accepted plays use.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::model::{Card, ParseError, Rank, Suit};

/// Cards per shoe: 52 standard plus the two jokers.
pub const CARDS_PER_SHOE: usize = 54;

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum DeckError {
    #[snafu(display("requested cards are not all present"))]
    CardsUnavailable,
    #[snafu(display("index {} is out of range", index))]
    IndexOutOfRange { index: usize },
    #[snafu(display("index {} given more than once", index))]
    DuplicateIndex { index: usize },
    #[snafu(display("destination {} falls inside the moved cards", dest))]
    DestinationInSource { dest: usize },
    #[snafu(display("invalid range {}..={}", start, end))]
    BadRange { start: usize, end: usize },
    #[snafu(display("no cards selected"))]
    EmptySelection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub fn new() -> Deck {
        Deck::default()
    }

    pub fn from_cards(cards: Vec<Card>) -> Deck {
        Deck { cards }
    }

    /// Build and shuffle a shoe of `num_shoes` decks. Zero shoes yield an
    /// empty deck.
    pub fn deal(num_shoes: usize) -> Deck {
        let mut cards = Vec::with_capacity(num_shoes * CARDS_PER_SHOE);
        for _ in 0..num_shoes {
            for &suit in Suit::ALL.iter() {
                for &rank in Rank::NATURALS.iter() {
                    cards.push(Card::new(suit, rank));
                }
            }
            cards.push(Card::small_joker());
            cards.push(Card::big_joker());
        }
        let mut deck = Deck { cards };
        deck.shuffle();
        deck
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut thread_rng());
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Partition into `n` near-equal contiguous chunks, excess cards going
    /// to the earliest chunks. Returns no chunks for `n = 0` or an empty
    /// source.
    pub fn split(&self, n: usize) -> Vec<Deck> {
        if n == 0 || self.cards.is_empty() {
            return Vec::new();
        }
        let per = self.cards.len() / n;
        let extra = self.cards.len() % n;
        let mut chunks = Vec::with_capacity(n);
        let mut start = 0;
        for i in 0..n {
            let count = per + if i < extra { 1 } else { 0 };
            let end = (start + count).min(self.cards.len());
            chunks.push(Deck::from_cards(self.cards[start..end].to_vec()));
            start = end;
        }
        chunks
    }

    pub fn draw(&mut self) -> Option<Card> {
        if self.cards.is_empty() {
            None
        } else {
            Some(self.cards.remove(0))
        }
    }

    /// Draw up to `n` cards from the top.
    pub fn draw_n(&mut self, n: usize) -> Vec<Card> {
        let n = n.min(self.cards.len());
        self.cards.drain(..n).collect()
    }

    pub fn add(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn add_to_top(&mut self, card: Card) {
        self.cards.insert(0, card);
    }

    /// Remove the first card equal to `card`, if present.
    pub fn remove(&mut self, card: Card) -> bool {
        match self.cards.iter().position(|&c| c == card) {
            Some(i) => {
                self.cards.remove(i);
                true
            }
            None => false,
        }
    }

    /// Whether every requested card is present in sufficient quantity,
    /// counting duplicates across shoes.
    pub fn contains_all(&self, cards: &[Card]) -> bool {
        let mut need: HashMap<Card, usize> = HashMap::new();
        for &card in cards {
            *need.entry(card).or_insert(0) += 1;
        }
        need.iter().all(|(card, &n)| {
            self.cards.iter().filter(|&&c| c == *card).count() >= n
        })
    }

    /// Atomic removal by value: either every requested card is removed or
    /// the deck is left untouched.
    pub fn remove_many(&mut self, cards: &[Card]) -> Result<(), DeckError> {
        if cards.is_empty() {
            return Ok(());
        }
        if !self.contains_all(cards) {
            return CardsUnavailable.fail();
        }
        let mut remove: HashMap<Card, usize> = HashMap::new();
        for &card in cards {
            *remove.entry(card).or_insert(0) += 1;
        }
        self.cards.retain(|c| match remove.get_mut(c) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        });
        Ok(())
    }

    /// Atomic removal by position. All indices are validated (in range, no
    /// duplicates) before anything is removed; the removed cards come back
    /// in the order their indices were given.
    pub fn remove_by_indices(&mut self, indices: &[usize]) -> Result<Vec<Card>, DeckError> {
        let mut taken = vec![false; self.cards.len()];
        for &i in indices {
            if i >= self.cards.len() {
                return IndexOutOfRange { index: i }.fail();
            }
            if taken[i] {
                return DuplicateIndex { index: i }.fail();
            }
            taken[i] = true;
        }
        let removed = indices.iter().map(|&i| self.cards[i]).collect();
        let mut rest = Vec::with_capacity(self.cards.len() - indices.len());
        for (i, &card) in self.cards.iter().enumerate() {
            if !taken[i] {
                rest.push(card);
            }
        }
        self.cards = rest;
        Ok(removed)
    }

    /// Move the cards at `start..=end` to sit immediately before `dest`,
    /// preserving their relative order. A destination inside
    /// `[start, end+1]` has no meaningful result and is rejected.
    pub fn move_range(&mut self, start: usize, end: usize, dest: usize) -> Result<(), DeckError> {
        if start > end || end >= self.cards.len() {
            return BadRange { start, end }.fail();
        }
        if dest > self.cards.len() {
            return IndexOutOfRange { index: dest }.fail();
        }
        if dest >= start && dest <= end + 1 {
            return DestinationInSource { dest }.fail();
        }
        let block: Vec<Card> = self.cards.drain(start..=end).collect();
        let dest = if dest > end { dest - block.len() } else { dest };
        self.cards.splice(dest..dest, block);
        Ok(())
    }

    /// Move an arbitrary index set to sit immediately before `dest`,
    /// preserving the moved cards' relative order.
    pub fn move_indices(&mut self, indices: &[usize], dest: usize) -> Result<(), DeckError> {
        if indices.is_empty() {
            return EmptySelection.fail();
        }
        let mut taken = vec![false; self.cards.len()];
        let (mut min, mut max) = (self.cards.len(), 0);
        for &i in indices {
            if i >= self.cards.len() {
                return IndexOutOfRange { index: i }.fail();
            }
            if taken[i] {
                return DuplicateIndex { index: i }.fail();
            }
            taken[i] = true;
            min = min.min(i);
            max = max.max(i);
        }
        if dest > self.cards.len() {
            return IndexOutOfRange { index: dest }.fail();
        }
        if dest >= min && dest <= max + 1 {
            return DestinationInSource { dest }.fail();
        }
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        let block: Vec<Card> = sorted.iter().map(|&i| self.cards[i]).collect();
        for &i in sorted.iter().rev() {
            self.cards.remove(i);
        }
        let dest = if dest > max { dest - block.len() } else { dest };
        self.cards.splice(dest..dest, block);
        Ok(())
    }

    /// Organize a hand for display: jokers first (big before small), then
    /// trump-rank cards by suit, then the rest by ascending rank with the
    /// same suit tie-break. Not a rule-engine input.
    pub fn sort(&mut self, trump: Rank) {
        self.cards.sort_by_key(|card| sort_key(card, trump));
    }
}

fn sort_key(card: &Card, trump: Rank) -> (u8, u8, u8) {
    let suit_slot = card.suit.map(|s| 4 - s.weight()).unwrap_or(0);
    match card.rank {
        Rank::BigJoker => (0, 0, 0),
        Rank::SmallJoker => (1, 0, 0),
        rank if rank == trump => (2, suit_slot, 0),
        rank => (3, rank.value(), suit_slot),
    }
}

impl fmt::Display for Deck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, card) in self.cards.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", card)?;
        }
        Ok(())
    }
}

impl FromStr for Deck {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        let cards = s
            .split_whitespace()
            .map(|token| token.parse())
            .collect::<Result<Vec<Card>, ParseError>>()?;
        Ok(Deck { cards })
    }
}
