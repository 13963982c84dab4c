//! Positions: the total order over `(key, id)` pairs, and the encoding of range bounds as
//! sentinel positions.

mod bounds;
mod position;
mod value;

pub use bounds::*;
pub use position::*;
pub use value::*;

#[cfg(test)]
mod position_tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn pos(key: impl Into<Value>, id: &str) -> Position {
        Position::new(key.into(), id)
    }

    fn contains(bounds: &Bounds, p: &Position) -> bool {
        let (lower, upper) = bounds.to_positions();
        lower.map_or(true, |l| &l <= p) && upper.map_or(true, |u| p < &u)
    }

    #[test]
    fn value_order_by_kind() {
        let mut values = vec![
            Value::from(vec![1i64]),
            Value::from("a"),
            Value::Bool(false),
            Value::Float(-1.5),
            Value::Int(10),
            Value::Null,
            Value::Bytes(vec![0x00]),
        ];
        values.sort();
        assert_eq!(
            vec![
                Value::Null,
                Value::Int(10),
                Value::Float(-1.5),
                Value::Bool(false),
                Value::from("a"),
                Value::Bytes(vec![0x00]),
                Value::from(vec![1i64]),
            ],
            values
        );
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn ids_break_ties() {
        assert!(pos(1i64, "a") < pos(1i64, "b"));
        assert!(pos(1i64, "z") < pos(2i64, "a"));
    }

    #[test]
    fn implode_round_trips_keys() {
        let key = Value::from(vec![Value::from("x"), Value::Int(3)]);
        let p = Position::new(key.clone(), "id");
        assert_eq!(key, p.key());
        assert_eq!(Some("id"), p.id());
        assert_eq!(Value::Int(4), pos(4i64, "i").key());
    }

    #[test]
    fn inclusive_and_exclusive_bounds() {
        let items = [pos(1i64, "a"), pos(2i64, "a"), pos(2i64, "b"), pos(3i64, "a")];
        let select = |bounds: Bounds| -> Vec<Position> {
            items.iter().filter(|p| contains(&bounds, p)).cloned().collect()
        };

        assert_eq!(items[1..].to_vec(), select(Bounds::lower(KeyBound::inclusive(2i64))));
        assert_eq!(items[3..].to_vec(), select(Bounds::lower(KeyBound::exclusive(2i64))));
        assert_eq!(items[..3].to_vec(), select(Bounds::upper(KeyBound::inclusive(2i64))));
        assert_eq!(items[..1].to_vec(), select(Bounds::upper(KeyBound::exclusive(2i64))));
        assert_eq!(
            items[1..3].to_vec(),
            select(Bounds::between(KeyBound::inclusive(2i64), KeyBound::inclusive(2i64)))
        );

        // Ids narrow a bound to a single item at its key.
        assert_eq!(
            items[2..].to_vec(),
            select(Bounds::lower(KeyBound::exclusive(2i64).with_id("a")))
        );
        assert_eq!(
            items[..3].to_vec(),
            select(Bounds::upper(KeyBound::inclusive(2i64).with_id("b")))
        );
    }

    #[test]
    fn prefix_bounds() {
        let key = |a: &str, b: i64| Value::from(vec![Value::from(a), Value::Int(b)]);
        let items = [
            Position::new(Value::from(vec![Value::from("a")]), "0"),
            Position::new(key("a", 1), "1"),
            Position::new(key("a", 2), "2"),
            Position::new(key("b", 1), "3"),
            Position::new(Value::from(vec![Value::from("a"), Value::Int(1), Value::Null]), "4"),
        ];
        let select = |prefix: Vec<Value>| -> Vec<String> {
            let bounds = Bounds::prefix(prefix);
            items
                .iter()
                .filter(|p| contains(&bounds, p))
                .map(|p| p.id().unwrap().to_string())
                .collect()
        };

        assert_eq!(vec!["0", "1", "2", "4"], select(vec![Value::from("a")]));
        assert_eq!(vec!["1", "4"], select(vec![Value::from("a"), Value::Int(1)]));
        assert_eq!(vec!["3"], select(vec![Value::from("b")]));
        assert_eq!(vec!["0", "1", "2", "3", "4"], select(vec![]));
        assert!(select(vec![Value::from("c")]).is_empty());
    }

    #[test]
    fn raw_bounds_reject_mixed_shapes() {
        let raw = RawBounds {
            lower: Some(KeyBound::inclusive(1i64)),
            prefix: Some(vec![Value::Int(1)]),
            ..Default::default()
        };
        assert!(matches!(Bounds::try_from(raw), Err(Error::InvalidBounds(_))));

        let raw = RawBounds { prefix: Some(vec![Value::Int(1)]), ..Default::default() };
        assert_eq!(Ok(Bounds::Prefix(vec![Value::Int(1)])), Bounds::try_from(raw));
        assert_eq!(Ok(Bounds::all()), Bounds::try_from(RawBounds::default()));
    }

    #[test]
    fn hashing_agrees_with_equality() {
        use crate::aggregate_engine::directory::Namespace;
        use std::collections::HashSet;

        let namespaces: HashSet<Namespace> = [
            Namespace::new(1i64),
            Namespace::new(1i64),
            Namespace::new(1.0),
            Namespace::new(-0.0),
            Namespace::new(0.0),
            Namespace::new(Value::from(vec![Value::from("a"), Value::Null])),
            Namespace::new(Value::from(vec![Value::from("a"), Value::Null])),
            Namespace::GLOBAL,
            Namespace::GLOBAL,
        ]
        .into_iter()
        .collect();
        assert_eq!(6, namespaces.len());
        assert!(namespaces.contains(&Namespace::new(Value::Float(f64::from_bits(0)))));
    }
}
