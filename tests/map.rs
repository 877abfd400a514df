use rc_runtime::{allocate, Keyed, Map, Obj, Ptr, RuntimeError, SimpleMap, StructMap, VisitOrder};

#[test]
fn put_a_b_a_yields_two_entries_in_ascending_order() {
    let mut m: Map<String, i32> = Map::new();
    m.put("a".into(), 1);
    m.put("b".into(), 2);
    m.put("a".into(), 3);
    assert_eq!(m.len(), 2);
    assert_eq!(m.get(&"a".to_string()), Some(&3));
    let pairs: Vec<(&str, i32)> = m.pairs().map(|(k, v)| (k.as_str(), *v)).collect();
    assert_eq!(pairs, vec![("a", 3), ("b", 2)]);
}

#[test]
fn get_after_remove_is_absent_and_others_survive() {
    let mut m: Map<u32, String> = Map::new();
    for k in [8, 3, 10, 1, 6, 14, 4, 7, 13] {
        m.put(k, format!("v{k}"));
    }
    assert_eq!(m.remove(&3).map(|(_, v)| v), Ok("v3".to_string()));
    assert_eq!(m.get(&3), None);
    assert_eq!(m.remove(&3), Err(RuntimeError::NotFound));
    for k in [8, 10, 1, 6, 14, 4, 7, 13] {
        assert_eq!(m.get(&k), Some(&format!("v{k}")));
    }
    assert_eq!(m.len(), 8);
}

#[test]
fn counted_values_follow_the_map() {
    let v = allocate(vec![1u8, 2, 3]);
    let mut m: Map<&'static str, Obj<Vec<u8>>> = Map::new();
    m.put("x", v.retain());
    m.put("y", v.retain());
    assert_eq!(v.refcount(), 3);
    let (_, removed) = m.remove(&"x").unwrap();
    drop(removed);
    assert_eq!(v.refcount(), 2);
    drop(m);
    assert_eq!(v.refcount(), 1);
}

#[test]
fn owned_and_foreign_string_values() {
    let mut m: Map<Ptr<str>, Ptr<str>> = Map::new();
    m.put("static".into(), "literal".into());
    m.put(String::from("heap").into(), String::from("copy").into());
    let refcounts: Vec<isize> = m.values().map(Ptr::refcount).collect();
    // "heap" sorts before "static".
    assert_eq!(refcounts, vec![1, -1]);
    let flat = SimpleMap::from_map(&m);
    assert_eq!(flat.len(), 2);
    assert_eq!(flat.get("heap").map(|v| &**v), Some("copy"));
}

#[derive(Debug)]
struct Account {
    id: u64,
    balance: i64,
}

impl Keyed for Account {
    type Key = u64;
    fn key(&self) -> &u64 {
        &self.id
    }
}

#[test]
fn struct_mode_keys_live_in_the_entry() {
    let mut m: StructMap<Account> = StructMap::new();
    for id in [30, 10, 20] {
        m.put_struct(Account { id, balance: 0 });
    }
    let twenty = m.put_struct(Account { id: 20, balance: 500 });
    assert_eq!(m.len(), 3);
    assert_eq!(twenty.entry(&m).map(|a| a.balance), Some(500));
    assert_eq!(m.get_entry(&20).map(|a| a.balance), Some(500));

    let mut post = Vec::new();
    m.visit(VisitOrder::Post, |a| post.push(a.id));
    assert_eq!(post, vec![20, 10, 30]);

    let removed = m.remove_entry(&30).unwrap();
    assert_eq!(removed.id, 30);
    let ids: Vec<u64> = m.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![10, 20]);
}

#[test]
fn increasing_keys_build_a_chain() {
    let mut m: Map<u32, ()> = Map::new();
    for k in 0..100 {
        m.put(k, ());
    }
    assert_eq!(m.height(), 100);
    assert_eq!(m.entry(m.last().unwrap()).map(|p| p.key), Some(99));
}
