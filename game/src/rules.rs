//! The play-validity and counter-play rule engine.
//!
//! Everything here is pure: a `Rules` value captures the round's trump rank
//! and answers questions about card multisets. Callers resolve wildcards
//! first (`resolve_equivalent`) and feed the declared-equivalent multiset to
//! classification and comparison.

use std::collections::BTreeMap;

use snafu::Snafu;

use crate::model::{Card, Rank};

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum WildcardError {
    #[snafu(display("equivalent list must match the played cards one to one"))]
    LengthMismatch,
    #[snafu(display("a joker cannot stand in for a wildcard"))]
    JokerEquivalent,
    #[snafu(display("a wildcard cannot stand in for another wildcard"))]
    WildcardEquivalent,
    #[snafu(display("only wildcards may declare a different card"))]
    NotAWildcard,
}

/// The shape of a syntactically valid play, classified from the
/// declared-equivalent multiset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Single(Rank),
    Pair(Rank),
    Triple(Rank),
    /// Four or more of a kind.
    Bomb { rank: Rank, size: usize },
    FullHouse { triple: Rank },
    Straight { anchor: Rank },
    StraightFlush { anchor: Rank },
    /// Three pairs of consecutive ranks; `top` is the highest pair rank.
    Plate { top: Rank },
    /// Two triples of consecutive ranks; `top` is the highest triple rank.
    Tube { top: Rank },
}

/// Rule engine for one round, parameterized by the trump rank.
#[derive(Debug, Clone, Copy)]
pub struct Rules {
    trump: Rank,
}

impl Rules {
    pub fn new(trump: Rank) -> Rules {
        Rules { trump }
    }

    pub fn trump(&self) -> Rank {
        self.trump
    }

    /// Trump-aware total order over ranks. Equal ranks are never greater;
    /// the trump rank sits above every natural rank but below both jokers.
    pub fn rank_greater(&self, a: Rank, b: Rank) -> bool {
        if a == b {
            return false;
        }
        if a != self.trump && b != self.trump {
            return a > b;
        }
        if a == self.trump {
            !b.is_joker()
        } else {
            a.is_joker()
        }
    }

    /// Classify a multiset of cards, or `None` when it forms no legal shape.
    pub fn classify(&self, play: &[Card]) -> Option<Shape> {
        let counts = rank_counts(play);
        match play.len() {
            0 => None,
            1 => Some(Shape::Single(play[0].rank)),
            2 => single_rank(&counts).map(Shape::Pair),
            3 => single_rank(&counts).map(Shape::Triple),
            4 => single_rank(&counts).map(|rank| Shape::Bomb { rank, size: 4 }),
            5 => self.classify_five(play, &counts),
            6 => self.classify_six(&counts),
            size => single_rank(&counts).map(|rank| Shape::Bomb { rank, size }),
        }
    }

    pub fn is_play_valid(&self, play: &[Card]) -> bool {
        self.classify(play).is_some()
    }

    /// Whether `counter` legally beats the standing `play`. Both sides are
    /// declared-equivalent multisets; a pass is handled by the caller and
    /// never reaches this comparison.
    pub fn is_counter_valid(&self, play: &[Card], counter: &[Card]) -> bool {
        let current = match self.classify(play) {
            Some(shape) => shape,
            None => return false,
        };
        let challenger = match self.classify(counter) {
            Some(shape) => shape,
            None => return false,
        };
        self.beats(current, challenger)
    }

    fn classify_five(&self, play: &[Card], counts: &BTreeMap<Rank, usize>) -> Option<Shape> {
        if let Some(rank) = single_rank(counts) {
            return Some(Shape::Bomb { rank, size: 5 });
        }
        if counts.len() == 2 {
            let (&high, &n) = counts.iter().next_back().unwrap();
            let (&low, _) = counts.iter().next().unwrap();
            return match n {
                3 => Some(Shape::FullHouse { triple: high }),
                2 => Some(Shape::FullHouse { triple: low }),
                _ => None,
            };
        }
        if counts.len() == 5 {
            let ranks: Vec<Rank> = counts.keys().copied().collect();
            if ranks_consecutive(&ranks) {
                let anchor = straight_anchor(&ranks);
                let flush = play
                    .iter()
                    .all(|c| c.suit.is_some() && c.suit == play[0].suit);
                return Some(if flush {
                    Shape::StraightFlush { anchor }
                } else {
                    Shape::Straight { anchor }
                });
            }
        }
        None
    }

    fn classify_six(&self, counts: &BTreeMap<Rank, usize>) -> Option<Shape> {
        if let Some(rank) = single_rank(counts) {
            return Some(Shape::Bomb { rank, size: 6 });
        }
        let ranks: Vec<Rank> = counts.keys().copied().collect();
        if counts.len() == 3 && counts.values().all(|&n| n == 2) && ranks_consecutive(&ranks) {
            return Some(Shape::Plate { top: ranks[2] });
        }
        if counts.len() == 2 && counts.values().all(|&n| n == 3) && ranks_consecutive(&ranks) {
            return Some(Shape::Tube { top: ranks[1] });
        }
        None
    }

    fn beats(&self, current: Shape, challenger: Shape) -> bool {
        use Shape::*;
        match current {
            Single(rank) => match challenger {
                Single(c) => self.rank_greater(c, rank),
                Bomb { .. } | StraightFlush { .. } => true,
                _ => false,
            },
            Pair(rank) => match challenger {
                Pair(c) => self.rank_greater(c, rank),
                Bomb { .. } | StraightFlush { .. } => true,
                _ => false,
            },
            Triple(rank) => match challenger {
                Triple(c) => self.rank_greater(c, rank),
                Bomb { .. } | StraightFlush { .. } => true,
                _ => false,
            },
            FullHouse { triple } => match challenger {
                FullHouse { triple: c } => self.rank_greater(c, triple),
                Bomb { .. } | StraightFlush { .. } => true,
                _ => false,
            },
            Straight { anchor } => match challenger {
                Straight { anchor: c } => self.rank_greater(c, anchor),
                Bomb { .. } | StraightFlush { .. } => true,
                _ => false,
            },
            Bomb { rank, size: 4 } => match challenger {
                Bomb { rank: c, size: 4 } => self.rank_greater(c, rank),
                Bomb { .. } => true,
                StraightFlush { .. } => true,
                _ => false,
            },
            Bomb { rank, size: 5 } => match challenger {
                StraightFlush { .. } => true,
                Bomb { rank: c, size: 5 } => self.rank_greater(c, rank),
                Bomb { size, .. } => size > 5,
                _ => false,
            },
            Bomb { rank, size: 6 } => match challenger {
                Bomb { rank: c, size: 6 } => self.rank_greater(c, rank),
                Bomb { size, .. } => size >= 7,
                _ => false,
            },
            Bomb { rank, size } => match challenger {
                Bomb { rank: c, size: cs } => cs > size || (cs == size && self.rank_greater(c, rank)),
                _ => false,
            },
            StraightFlush { anchor } => match challenger {
                StraightFlush { anchor: c } => self.rank_greater(c, anchor),
                _ => false,
            },
            Plate { top } => match challenger {
                Plate { top: c } => self.rank_greater(c, top),
                Bomb { .. } => true,
                _ => false,
            },
            Tube { top } => match challenger {
                Tube { top: c } => self.rank_greater(c, top),
                Bomb { .. } => true,
                _ => false,
            },
        }
    }

    /// Validate the player-supplied wildcard substitution and produce the
    /// declared-equivalent multiset classification operates on.
    ///
    /// An empty declaration means every card stands as itself. Otherwise the
    /// declaration is positional: non-wildcards must declare themselves, and
    /// a wildcard may declare itself or any single card that is neither a
    /// joker nor another wildcard.
    pub fn resolve_equivalent(
        &self,
        attempt: &[Card],
        declared: &[Card],
    ) -> Result<Vec<Card>, WildcardError> {
        if declared.is_empty() {
            return Ok(attempt.to_vec());
        }
        if declared.len() != attempt.len() {
            return LengthMismatch.fail();
        }
        for (&physical, &equivalent) in attempt.iter().zip(declared) {
            if physical == equivalent {
                continue;
            }
            if !physical.is_wildcard(self.trump) {
                return NotAWildcard.fail();
            }
            if equivalent.rank.is_joker() {
                return JokerEquivalent.fail();
            }
            if equivalent.is_wildcard(self.trump) {
                return WildcardEquivalent.fail();
            }
        }
        Ok(declared.to_vec())
    }
}

fn rank_counts(cards: &[Card]) -> BTreeMap<Rank, usize> {
    let mut counts = BTreeMap::new();
    for card in cards {
        *counts.entry(card.rank).or_insert(0) += 1;
    }
    counts
}

fn single_rank(counts: &BTreeMap<Rank, usize>) -> Option<Rank> {
    if counts.len() == 1 {
        counts.keys().next().copied()
    } else {
        None
    }
}

/// Strict rank adjacency over natural ranks, with the ace-low sets
/// {2,3,4,5,A} and {2,3,4,5,6,A} as the only exceptions. Jokers never
/// participate. Expects distinct ranks in ascending order.
fn ranks_consecutive(sorted: &[Rank]) -> bool {
    if sorted.iter().any(|r| r.is_joker()) {
        return false;
    }
    if is_ace_low(sorted) {
        return true;
    }
    sorted
        .windows(2)
        .all(|pair| pair[1].value() == pair[0].value() + 1)
}

fn is_ace_low(sorted: &[Rank]) -> bool {
    match sorted {
        [Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Ace] => true,
        [Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Ace] => true,
        _ => false,
    }
}

/// The rank a straight is compared by: its highest rank, except that the
/// ace plays low in the wheel.
fn straight_anchor(sorted: &[Rank]) -> Rank {
    if is_ace_low(sorted) {
        sorted[sorted.len() - 2]
    } else {
        sorted[sorted.len() - 1]
    }
}
