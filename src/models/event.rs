use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

pub const CONTACT_WEIGHT: f32 = 0.6;
pub const DETAIL_WEIGHT: f32 = 0.3;
pub const DEFAULT_WEIGHT: f32 = 0.1;

/// Interaction a consumer had with an item, ordered by purchase intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Consumer contacted the seller.
    Contact,
    /// Consumer opened the item detail page.
    Detail,
    /// Item was shown in a listing.
    Listing,
    /// Any other event name, kept verbatim.
    Other(String),
}

impl EventType {
    /// Contribution of the item vector to the consumer profile.
    pub fn weight(&self) -> f32 {
        match self {
            EventType::Contact => CONTACT_WEIGHT,
            EventType::Detail => DETAIL_WEIGHT,
            EventType::Listing | EventType::Other(_) => DEFAULT_WEIGHT,
        }
    }
}

impl FromStr for EventType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "contact" => EventType::Contact,
            "detail" => EventType::Detail,
            "listing" => EventType::Listing,
            _ => EventType::Other(s.trim().to_string()),
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Contact => write!(f, "contact"),
            EventType::Detail => write!(f, "detail"),
            EventType::Listing => write!(f, "listing"),
            EventType::Other(name) => write!(f, "{}", name),
        }
    }
}
