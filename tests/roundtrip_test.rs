use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use cbf_encoder::{
    decode, decode_value, encode, encode_value, EncoderError, Item, ListItem, MapItem, RecordItem,
    SchemaRegistry, TypeInfo, TypeKey, TypeResolver, TypeShape, TypeTag,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

fn roundtrip(root: &Item, registry: &SchemaRegistry) -> Item {
    let mut reader = encode(root, registry).unwrap();
    decode(&mut reader, registry).unwrap()
}

fn roundtrip_value<T>(value: T) -> T
where
    T: cbf_encoder::ToItem + cbf_encoder::FromItem,
{
    let registry = SchemaRegistry::new();
    let mut reader = encode_value(&value, &registry).unwrap();
    decode_value(&mut reader, &registry).unwrap()
}

#[test]
fn test_scalar_boundaries() {
    assert_eq!(roundtrip_value(i8::MIN), i8::MIN);
    assert_eq!(roundtrip_value(i8::MAX), i8::MAX);
    assert_eq!(roundtrip_value(u8::MAX), u8::MAX);
    assert_eq!(roundtrip_value(i16::MIN), i16::MIN);
    assert_eq!(roundtrip_value(u16::MAX), u16::MAX);
    assert_eq!(roundtrip_value(i32::MIN), i32::MIN);
    assert_eq!(roundtrip_value(u32::MAX), u32::MAX);
    assert_eq!(roundtrip_value(i64::MIN), i64::MIN);
    assert_eq!(roundtrip_value(i64::MAX), i64::MAX);
    assert_eq!(roundtrip_value(u64::MAX), u64::MAX);
    assert_eq!(roundtrip_value(0u64), 0);
    assert_eq!(roundtrip_value(true), true);
    assert_eq!(roundtrip_value(false), false);
    assert_eq!(roundtrip_value('𝄞'), '𝄞');
    assert_eq!(roundtrip_value('\0'), '\0');
}

#[test]
fn test_floats_and_decimals() {
    assert_eq!(roundtrip_value(1.5f32), 1.5);
    assert_eq!(roundtrip_value(f32::MIN_POSITIVE), f32::MIN_POSITIVE);
    assert_eq!(roundtrip_value(-2.25e300f64), -2.25e300);
    let d = Decimal::new(-314159, 5);
    assert_eq!(roundtrip_value(d), d);
}

#[test]
fn test_strings_and_dates() {
    assert_eq!(roundtrip_value(String::new()), "");
    assert_eq!(roundtrip_value("héllo wörld".to_string()), "héllo wörld");
    let date = NaiveDate::from_ymd_opt(2020, 5, 17)
        .unwrap()
        .and_hms_micro_opt(1, 2, 3, 4)
        .unwrap();
    assert_eq!(roundtrip_value(date), date);
}

#[test]
fn test_options() {
    assert_eq!(roundtrip_value(None::<i32>), None);
    assert_eq!(roundtrip_value(Some(42i32)), Some(42));
    assert_eq!(roundtrip_value(vec![Some(1u32), None, Some(3)]), vec![
        Some(1),
        None,
        Some(3)
    ]);
}

#[test]
fn test_sequences() {
    assert_eq!(roundtrip_value(Vec::<i32>::new()), Vec::<i32>::new());
    assert_eq!(roundtrip_value(vec![1i32, -2, 3]), vec![1, -2, 3]);
    assert_eq!(
        roundtrip_value(vec!["a".to_string(), "b".to_string(), "a".to_string()]),
        vec!["a", "b", "a"]
    );
    assert_eq!(roundtrip_value([9u8, 8, 7, 6]), [9, 8, 7, 6]);
    // Heterogeneous elements self-describe.
    let mixed = vec![Item::I32(1), Item::Str("two".into()), Item::Null];
    assert_eq!(roundtrip_value(mixed.clone()), mixed);
}

#[test]
fn test_maps() {
    let mut by_name = BTreeMap::new();
    by_name.insert("one".to_string(), 1i64);
    by_name.insert("two".to_string(), 2);
    assert_eq!(roundtrip_value(by_name.clone()), by_name);

    let mut hashed = HashMap::new();
    hashed.insert(7u32, "seven".to_string());
    hashed.insert(8, "eight".to_string());
    assert_eq!(roundtrip_value(hashed.clone()), hashed);
}

#[test]
fn test_nested_records() {
    let mut registry = SchemaRegistry::new();
    registry.register_record(
        TypeKey::new("address", "demo"),
        false,
        vec!["city".into(), "zip".into()],
    );
    registry.register_record(
        TypeKey::new("person", "demo"),
        false,
        vec!["name".into(), "home".into(), "nicknames".into()],
    );

    let mut home = RecordItem::new(TypeKey::new("address", "demo"));
    home.set("city", Item::Str("Berlin".into()));
    home.set("zip", Item::U32(10115));

    let mut nicknames = ListItem::new(TypeKey::vec(), TypeTag::Str);
    nicknames.items.push(Item::Str("Al".into()));
    nicknames.items.push(Item::Str("Bert".into()));

    let mut person = RecordItem::new(TypeKey::new("person", "demo"));
    person.set("name", Item::Str("Albert".into()));
    person.set("home", Item::Record(home));
    person.set("nicknames", Item::List(nicknames));

    let root = Item::Record(person);
    assert_eq!(roundtrip(&root, &registry), root);
}

#[test]
fn test_list_with_extra_members() {
    let mut registry = SchemaRegistry::new();
    let key = TypeKey::new("bounded_list", "demo");
    registry.register_list(key.clone(), TypeTag::I32, vec!["limit".into()]);

    let mut list = ListItem::new(key, TypeTag::I32);
    list.extra.insert("limit".into(), Item::U32(16));
    list.items.extend([Item::I32(1), Item::I32(2), Item::I32(3)]);

    let root = Item::List(list);
    let decoded = roundtrip(&root, &registry);
    assert_eq!(decoded, root);
    match decoded {
        Item::List(l) => {
            assert_eq!(l.extra.get("limit"), Some(&Item::U32(16)));
            assert_eq!(l.elem_tag, TypeTag::I32);
        }
        other => panic!("expected a list, got {:?}", other),
    }
}

#[test]
fn test_map_with_extra_members() {
    let mut registry = SchemaRegistry::new();
    let key = TypeKey::new("tagged_map", "demo");
    registry.register_map(key.clone(), vec!["label".into()]);

    let mut map = MapItem::new(key);
    map.extra.insert("label".into(), Item::Str("scores".into()));
    map.entries.push((Item::Str("a".into()), Item::F64(0.5)));
    map.entries.push((Item::Str("b".into()), Item::F64(1.5)));

    let root = Item::Map(map);
    assert_eq!(roundtrip(&root, &registry), root);
}

#[test]
fn test_record_inside_map_values() {
    let mut registry = SchemaRegistry::new();
    registry.register_record(TypeKey::new("point", "demo"), true, vec![
        "x".into(),
        "y".into(),
    ]);

    let mut point = RecordItem::new(TypeKey::new("point", "demo"));
    point.set("x", Item::F32(1.0));
    point.set("y", Item::F32(-1.0));

    let mut map = MapItem::new(TypeKey::hash_map());
    map.entries.push((Item::Str("origin".into()), Item::Record(point)));

    let root = Item::Map(map);
    assert_eq!(roundtrip(&root, &registry), root);
}

#[test]
fn test_decode_fails_without_schema() {
    let mut registry = SchemaRegistry::new();
    let key = TypeKey::new("ghost", "demo");
    registry.register_record(key.clone(), false, vec!["id".into()]);

    let mut record = RecordItem::new(key);
    record.set("id", Item::U64(1));
    let buf = encode(&Item::Record(record), &registry).unwrap();

    let empty = SchemaRegistry::new();
    let mut reader = buf;
    match decode(&mut reader, &empty) {
        Err(EncoderError::TypeNotFound(key)) => {
            assert_eq!(key, TypeKey::new("ghost", "demo"));
        }
        other => panic!("expected TypeNotFound, got {:?}", other),
    }
}

#[test]
fn test_file_roundtrip() {
    let mut registry = SchemaRegistry::new();
    registry.register_record(TypeKey::new("event", "demo"), false, vec![
        "id".into(),
        "label".into(),
    ]);

    let mut event = RecordItem::new(TypeKey::new("event", "demo"));
    event.set("id", Item::U64(7));
    event.set("label", Item::Str("startup".into()));
    let root = Item::Record(event);

    let path = std::env::temp_dir().join(format!("cbf-roundtrip-{}.bin", std::process::id()));
    cbf_encoder::write_file(&path, &root, &registry).unwrap();
    let decoded = cbf_encoder::read_file(&path, &registry).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(decoded, root);
}

/// Delegating resolver that counts member-enumeration requests.
struct CountingResolver {
    inner: SchemaRegistry,
    describes: RefCell<Vec<TypeKey>>,
}

impl TypeResolver for CountingResolver {
    fn describe(&self, key: &TypeKey) -> cbf_encoder::Result<TypeInfo> {
        self.describes.borrow_mut().push(key.clone());
        self.inner.describe(key)
    }

    fn construct(&self, key: &TypeKey, shape: TypeShape) -> cbf_encoder::Result<Item> {
        self.inner.construct(key, shape)
    }

    fn get_member(&self, instance: &Item, name: &str) -> cbf_encoder::Result<Item> {
        self.inner.get_member(instance, name)
    }

    fn set_member(&self, instance: &mut Item, name: &str, value: Item) -> cbf_encoder::Result<()> {
        self.inner.set_member(instance, name, value)
    }

    fn insert_element(&self, list: &mut Item, value: Item) -> cbf_encoder::Result<()> {
        self.inner.insert_element(list, value)
    }

    fn insert_entry(&self, map: &mut Item, key: Item, value: Item) -> cbf_encoder::Result<()> {
        self.inner.insert_entry(map, key, value)
    }
}

#[test]
fn test_member_list_computed_once_per_type() {
    let mut inner = SchemaRegistry::new();
    let key = TypeKey::new("point", "demo");
    inner.register_record(key.clone(), true, vec!["x".into(), "y".into()]);
    let resolver = CountingResolver {
        inner,
        describes: RefCell::new(Vec::new()),
    };

    let mut first = RecordItem::new(key.clone());
    first.set("x", Item::I32(1));
    first.set("y", Item::I32(2));
    let mut second = RecordItem::new(key.clone());
    second.set("x", Item::I32(3));
    second.set("y", Item::I32(4));

    let root = Item::List({
        let mut l = ListItem::new(TypeKey::vec(), TypeTag::Record);
        l.items.push(Item::Record(first));
        l.items.push(Item::Record(second));
        l
    });
    let buf = encode(&root, &resolver).unwrap();

    // Two instances of the same type, one member enumeration.
    let point_describes = resolver
        .describes
        .borrow()
        .iter()
        .filter(|k| **k == key)
        .count();
    assert_eq!(point_describes, 1);

    let mut reader = buf;
    assert_eq!(decode(&mut reader, &resolver).unwrap(), root);
}
