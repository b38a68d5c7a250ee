//! The fixed asset universes.
//!
//! Two risky candidates and one safe candidate per segment. These are
//! static data: the rotation never trades outside them, and exchange
//! routing is carried per candidate rather than derived from the segment
//! (the overseas safe asset trades on NYSE while the risky pair is NASD).

use crate::types::{AssetRole, Candidate, Segment};

/// Domestic (KRX) universe: KODEX 200 vs TIGER Nasdaq 100, falling back
/// to the 3-year treasury ETF when neither shows positive momentum.
pub const DOMESTIC: &[Candidate] = &[
    Candidate {
        code: "069500",
        name: "KODEX 200",
        exchange: "KRX",
        role: AssetRole::Risky,
    },
    Candidate {
        code: "133690",
        name: "TIGER 나스닥100",
        exchange: "KRX",
        role: AssetRole::Risky,
    },
    Candidate {
        code: "069660",
        name: "KODEX 국고채3년",
        exchange: "KRX",
        role: AssetRole::Safe,
    },
];

/// Overseas (US) universe: TQQQ vs EFA, falling back to GLD.
pub const OVERSEAS: &[Candidate] = &[
    Candidate {
        code: "TQQQ",
        name: "TQQQ",
        exchange: "NASD",
        role: AssetRole::Risky,
    },
    Candidate {
        code: "EFA",
        name: "EFA",
        exchange: "NASD",
        role: AssetRole::Risky,
    },
    Candidate {
        code: "GLD",
        name: "GLD",
        exchange: "NYSE",
        role: AssetRole::Safe,
    },
];

/// The candidate set for a segment, risky candidates first in priority
/// order (the tie-break favors the earlier entry).
pub fn candidates(segment: Segment) -> &'static [Candidate] {
    match segment {
        Segment::Domestic => DOMESTIC,
        Segment::Overseas => OVERSEAS,
    }
}

/// The two risky candidates of a segment, in priority order.
pub fn risky(segment: Segment) -> Vec<Candidate> {
    candidates(segment)
        .iter()
        .filter(|c| c.role == AssetRole::Risky)
        .copied()
        .collect()
}

/// The safe candidate of a segment.
pub fn safe(segment: Segment) -> Candidate {
    candidates(segment)
        .iter()
        .find(|c| c.role == AssetRole::Safe)
        .copied()
        .expect("every universe carries exactly one safe candidate")
}

/// Look up a candidate by code within a segment.
pub fn by_code(segment: Segment, code: &str) -> Option<Candidate> {
    candidates(segment).iter().find(|c| c.code == code).copied()
}

/// Exchange code for routing an order on `symbol`. Symbols outside the
/// universe (stray positions we only ever sell) fall back to the
/// segment's primary exchange.
pub fn exchange_for(segment: Segment, symbol: &str) -> &'static str {
    by_code(segment, symbol)
        .map(|c| c.exchange)
        .unwrap_or(match segment {
            Segment::Domestic => "KRX",
            Segment::Overseas => "NASD",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_shape() {
        for &segment in Segment::ALL {
            assert_eq!(risky(segment).len(), 2);
            assert_eq!(safe(segment).role, AssetRole::Safe);
            assert_eq!(candidates(segment).len(), 3);
        }
    }

    #[test]
    fn test_safe_asset_routes_to_its_own_exchange() {
        assert_eq!(safe(Segment::Overseas).code, "GLD");
        assert_eq!(exchange_for(Segment::Overseas, "GLD"), "NYSE");
        assert_eq!(exchange_for(Segment::Overseas, "TQQQ"), "NASD");
        // Unknown overseas symbol sells through the primary exchange.
        assert_eq!(exchange_for(Segment::Overseas, "AAPL"), "NASD");
    }

    #[test]
    fn test_by_code() {
        assert_eq!(by_code(Segment::Domestic, "069500").unwrap().name, "KODEX 200");
        assert!(by_code(Segment::Domestic, "TQQQ").is_none());
    }
}
