use rand::Rng;

use super::Card;

const CARDS_PER_DECK: usize = 52;

// Blackjack values of one suit: 2-9, four ten-valued ranks and the ace.
const SUIT_RANKS: [u32; 13] = [2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 10, 10, 1];

/// Multi-deck shoe. Cards are drawn uniformly at random without replacement, and the whole shoe
/// is replaced with a fresh one as soon as it runs below the reshuffle mark.
#[derive(Clone, Debug)]
pub struct Shoe {
    decks: u32,
    // Reshuffle when fewer cards than this remain.
    reshuffle_below: f64,
    cards: Vec<Card>,
}

impl Shoe {
    /// Creates a full shoe of `decks` decks, reshuffled once less than `reshuffle_fraction` of
    /// it remains.
    pub fn new(decks: u32, reshuffle_fraction: f64) -> Shoe {
        Shoe {
            decks,
            reshuffle_below: reshuffle_fraction * (CARDS_PER_DECK * decks as usize) as f64,
            cards: fresh_cards(decks),
        }
    }

    /// A shoe holding exactly `cards` that is never reshuffled.
    #[cfg(test)]
    pub fn stacked(cards: Vec<Card>) -> Shoe {
        Shoe {
            decks: 0,
            reshuffle_below: 0.0,
            cards,
        }
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn needs_reshuffle(&self) -> bool {
        (self.cards.len() as f64) < self.reshuffle_below
    }

    pub fn reshuffle(&mut self) {
        self.cards = fresh_cards(self.decks);
    }

    /// Takes one random card out of the shoe, reshuffling first if the shoe is low.
    ///
    /// Panics if the shoe is empty, which can only happen with a stacked shoe.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Card {
        if self.needs_reshuffle() {
            self.reshuffle();
        }
        assert!(!self.cards.is_empty(), "draw from an empty shoe");

        let i = rng.gen_range(0..self.cards.len());
        self.cards.remove(i)
    }
}

fn fresh_cards(decks: u32) -> Vec<Card> {
    let suits = decks as usize * 4;
    let mut cards = Vec::with_capacity(suits * SUIT_RANKS.len());
    for _ in 0..suits {
        cards.extend(SUIT_RANKS.iter().map(|rank| Card::from_rank(*rank)));
    }
    cards
}
