//! Card, suit, and rank value types, plus their wire-token codec.
//!
//! Tokens are the canonical text form used everywhere a card crosses the
//! wire: `A-S`, `10-H`, and the literal `Jr`/`BJr` for the two jokers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[snafu(display("unknown rank token '{}'", token))]
    UnknownRank { token: String },
    #[snafu(display("unknown suit letter '{}'", token))]
    UnknownSuit { token: String },
    #[snafu(display("malformed card token '{}'", token))]
    MalformedCard { token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suit {
    Spade,
    Heart,
    Diamond,
    Club,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Diamond, Suit::Club];

    pub fn letter(self) -> char {
        match self {
            Suit::Spade => 'S',
            Suit::Heart => 'H',
            Suit::Diamond => 'D',
            Suit::Club => 'C',
        }
    }

    /// Display weight used when organizing a hand: Spade > Heart > Club > Diamond.
    pub(crate) fn weight(self) -> u8 {
        match self {
            Suit::Spade => 4,
            Suit::Heart => 3,
            Suit::Club => 2,
            Suit::Diamond => 1,
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Suit {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "S" => Ok(Suit::Spade),
            "H" => Ok(Suit::Heart),
            "D" => Ok(Suit::Diamond),
            "C" => Ok(Suit::Club),
            _ => UnknownSuit { token: s }.fail(),
        }
    }
}

/// Rank order is fixed and context-free; trump elevation is applied by the
/// rule engine at comparison time, never stored in the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
    SmallJoker,
    BigJoker,
}

impl Rank {
    pub const NATURALS: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn is_joker(self) -> bool {
        match self {
            Rank::SmallJoker | Rank::BigJoker => true,
            _ => false,
        }
    }

    pub fn is_natural(self) -> bool {
        !self.is_joker()
    }

    /// Successor among the natural ranks, Ace wrapping back to Two.
    ///
    /// Placeholder trump-advancement rule; a scoring-driven rule replaces
    /// this once the tribute economy is designed.
    pub fn next_natural(self) -> Rank {
        match self {
            Rank::Two => Rank::Three,
            Rank::Three => Rank::Four,
            Rank::Four => Rank::Five,
            Rank::Five => Rank::Six,
            Rank::Six => Rank::Seven,
            Rank::Seven => Rank::Eight,
            Rank::Eight => Rank::Nine,
            Rank::Nine => Rank::Ten,
            Rank::Ten => Rank::Jack,
            Rank::Jack => Rank::Queen,
            Rank::Queen => Rank::King,
            Rank::King => Rank::Ace,
            Rank::Ace => Rank::Two,
            joker => joker,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
            Rank::SmallJoker => "Jr",
            Rank::BigJoker => "BJr",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for Rank {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        let rank = match s {
            "2" => Rank::Two,
            "3" => Rank::Three,
            "4" => Rank::Four,
            "5" => Rank::Five,
            "6" => Rank::Six,
            "7" => Rank::Seven,
            "8" => Rank::Eight,
            "9" => Rank::Nine,
            "10" => Rank::Ten,
            "J" => Rank::Jack,
            "Q" => Rank::Queen,
            "K" => Rank::King,
            "A" => Rank::Ace,
            "Jr" => Rank::SmallJoker,
            "BJr" => Rank::BigJoker,
            _ => return UnknownRank { token: s }.fail(),
        };
        Ok(rank)
    }
}

/// An immutable playing card. Jokers carry no suit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub suit: Option<Suit>,
    pub rank: Rank,
}

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Card {
        debug_assert!(rank.is_natural());
        Card {
            suit: Some(suit),
            rank,
        }
    }

    pub fn small_joker() -> Card {
        Card {
            suit: None,
            rank: Rank::SmallJoker,
        }
    }

    pub fn big_joker() -> Card {
        Card {
            suit: None,
            rank: Rank::BigJoker,
        }
    }

    /// The round's wildcard is the Heart at the trump rank.
    pub fn is_wildcard(self, trump: Rank) -> bool {
        self.suit == Some(Suit::Heart) && self.rank == trump
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.suit {
            Some(suit) if self.rank.is_natural() => write!(f, "{}-{}", self.rank, suit),
            _ => write!(f, "{}", self.rank),
        }
    }
}

impl FromStr for Card {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "Jr" => return Ok(Card::small_joker()),
            "BJr" => return Ok(Card::big_joker()),
            _ => {}
        }
        let sep = match s.find('-') {
            Some(sep) => sep,
            None => return MalformedCard { token: s }.fail(),
        };
        let rank: Rank = s[..sep].parse()?;
        let suit: Suit = s[sep + 1..].parse()?;
        if rank.is_joker() {
            // A suited joker token is not a thing.
            return MalformedCard { token: s }.fail();
        }
        Ok(Card::new(suit, rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_tokens_round_trip() {
        for &suit in Suit::ALL.iter() {
            for &rank in Rank::NATURALS.iter() {
                let card = Card::new(suit, rank);
                let token = card.to_string();
                assert_eq!(token.parse::<Card>().unwrap(), card);
            }
        }
        assert_eq!("Jr".parse::<Card>().unwrap(), Card::small_joker());
        assert_eq!("BJr".parse::<Card>().unwrap(), Card::big_joker());
    }

    #[test]
    fn representative_tokens() {
        assert_eq!(Card::new(Suit::Spade, Rank::Ace).to_string(), "A-S");
        assert_eq!(Card::new(Suit::Heart, Rank::Ten).to_string(), "10-H");
        assert_eq!(Card::small_joker().to_string(), "Jr");
        assert_eq!(Card::big_joker().to_string(), "BJr");
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!("".parse::<Card>().is_err());
        assert!("AS".parse::<Card>().is_err());
        assert!("A-X".parse::<Card>().is_err());
        assert!("11-S".parse::<Card>().is_err());
        assert!("Jr-S".parse::<Card>().is_err());
    }

    #[test]
    fn rank_order_puts_jokers_on_top() {
        assert!(Rank::BigJoker > Rank::SmallJoker);
        assert!(Rank::SmallJoker > Rank::Ace);
        assert!(Rank::Ace > Rank::Two);
        assert_eq!(Rank::Two.value(), 2);
        assert_eq!(Rank::BigJoker.value(), 16);
    }

    #[test]
    fn next_natural_wraps_at_ace() {
        assert_eq!(Rank::Two.next_natural(), Rank::Three);
        assert_eq!(Rank::King.next_natural(), Rank::Ace);
        assert_eq!(Rank::Ace.next_natural(), Rank::Two);
    }

    #[test]
    fn wildcard_is_the_trump_heart() {
        assert!(Card::new(Suit::Heart, Rank::Five).is_wildcard(Rank::Five));
        assert!(!Card::new(Suit::Spade, Rank::Five).is_wildcard(Rank::Five));
        assert!(!Card::new(Suit::Heart, Rank::Six).is_wildcard(Rank::Five));
        assert!(!Card::small_joker().is_wildcard(Rank::SmallJoker));
    }
}
