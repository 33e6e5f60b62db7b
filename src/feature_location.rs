//! Boundary and strand extraction from GenBank feature locations.

use crate::genome::Strand;
use gb_io::seq::{Feature, Location};

/// Coding span of one feature: outermost 0-based half-open boundaries, the
/// strand, and how many location segments make it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpan {
    pub left: usize,
    pub right: usize,
    pub strand: Strand,
    pub parts: usize,
}

fn collect_location_strands(location: &Location, reverse: bool, strands: &mut Vec<bool>) {
    match location {
        Location::Range(_, _) | Location::Between(_, _) => strands.push(reverse),
        Location::Complement(inner) => collect_location_strands(inner, !reverse, strands),
        Location::Join(parts)
        | Location::Order(parts)
        | Location::Bond(parts)
        | Location::OneOf(parts) => parts
            .iter()
            .for_each(|part| collect_location_strands(part, reverse, strands)),
        Location::External(_, Some(inner)) => collect_location_strands(inner, reverse, strands),
        Location::External(_, None) | Location::Gap(_) => {}
    }
}

/// Strand shared by every segment; mixed-strand features are unknown.
pub fn location_strand(location: &Location) -> Strand {
    let mut strands = Vec::new();
    collect_location_strands(location, false, &mut strands);
    match (strands.iter().all(|r| *r), strands.iter().any(|r| *r)) {
        _ if strands.is_empty() => Strand::Unknown,
        (true, _) => Strand::Reverse,
        (false, false) => Strand::Forward,
        (false, true) => Strand::Unknown,
    }
}

fn collect_location_ranges(location: &Location, ranges: &mut Vec<(i64, i64)>) {
    match location {
        Location::Range((from, _), (to, _)) | Location::Between(from, to) => {
            if *from < 0 || *to < 0 {
                return;
            }
            ranges.push((*from.min(to), *from.max(to)));
        }
        Location::Complement(inner) => collect_location_ranges(inner, ranges),
        Location::Join(parts)
        | Location::Order(parts)
        | Location::Bond(parts)
        | Location::OneOf(parts) => parts
            .iter()
            .for_each(|part| collect_location_ranges(part, ranges)),
        Location::External(_, Some(inner)) => collect_location_ranges(inner, ranges),
        Location::External(_, None) | Location::Gap(_) => {}
    }
}

/// Outermost span of a feature. Features without a usable range yield `None`.
pub fn feature_span(feature: &Feature) -> Option<FeatureSpan> {
    let mut ranges = Vec::new();
    collect_location_ranges(&feature.location, &mut ranges);
    if ranges.is_empty() {
        return None;
    }
    let left = ranges.iter().map(|r| r.0).min()?;
    let right = ranges.iter().map(|r| r.1).max()?;
    if left >= right {
        return None;
    }
    Some(FeatureSpan {
        left: usize::try_from(left).ok()?,
        right: usize::try_from(right).ok()?,
        strand: location_strand(&feature.location),
        parts: ranges.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow as FeatureKind;

    fn make_feature(location: Location) -> Feature {
        Feature {
            kind: FeatureKind::from("CDS"),
            location,
            qualifiers: vec![],
        }
    }

    #[test]
    fn test_complement_join_span() {
        let feature = make_feature(Location::Complement(Box::new(Location::Join(vec![
            Location::simple_range(10, 20),
            Location::simple_range(40, 50),
        ]))));
        let span = feature_span(&feature).unwrap();
        assert_eq!(
            span,
            FeatureSpan {
                left: 10,
                right: 50,
                strand: Strand::Reverse,
                parts: 2
            }
        );
    }

    #[test]
    fn test_simple_forward_span() {
        let span = feature_span(&make_feature(Location::simple_range(99, 402))).unwrap();
        assert_eq!((span.left, span.right, span.strand, span.parts), (99, 402, Strand::Forward, 1));
    }

    #[test]
    fn test_mixed_strand_is_unknown() {
        let location = Location::Join(vec![
            Location::simple_range(0, 30),
            Location::Complement(Box::new(Location::simple_range(60, 90))),
        ]);
        assert_eq!(location_strand(&location), Strand::Unknown);
    }
}
