use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Side::Long => "\u{1F7E2}",
            Side::Short => "\u{1F534}",
        }
    }
}

/// Impulse leg found by the detector: a single candle whose body dwarfs the
/// recent baseline and closes near its extreme.
#[derive(Debug, Clone, Copy)]
pub struct Impulse {
    pub index: usize,
    pub side: Side,
    /// Body divided by the average body baseline.
    pub strength: f64,
}

/// The order-block region left behind by an impulse. Price is expected to
/// retrace into it before continuing.
#[derive(Debug, Clone)]
pub struct MitigationZone {
    pub symbol: String,
    pub side: Side,
    pub low: f64,
    pub high: f64,
    /// Open time of the block candle. Stable across overlapping fetch
    /// windows, so it doubles as the dedupe identity for the zone.
    pub block_open_time: u64,
    pub block_index: usize,
}

impl MitigationZone {
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    /// The price level which, once closed through, invalidates the zone.
    pub fn invalidation_boundary(&self) -> f64 {
        match self.side {
            Side::Long => self.low,
            Side::Short => self.high,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub entry: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    /// Stop distance as a percentage of entry.
    pub sl_pct: f64,
    /// Block-candle open time of the originating zone.
    pub zone_id: u64,
    pub tier: Tier,
    pub score: u32,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn dedupe_key(&self) -> (String, u64) {
        (self.symbol.clone(), self.zone_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    None,
    B,
    A,
    APlus,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::None => "NONE",
            Tier::B => "B",
            Tier::A => "A",
            Tier::APlus => "A+",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Some(Tier::None),
            "B" => Some(Tier::B),
            "A" => Some(Tier::A),
            "A+" | "APLUS" => Some(Tier::APlus),
            _ => None,
        }
    }
}
