/*
 * Created on Tue Apr 22 2025
 *
 * This file is a part of Skygraph
 * Skygraph is a free and open-source embedded graph database that keeps
 * an entire labeled directed graph in a single on-disk file, written by
 * Sayan Nandan ("the Author") with the vision of making very large
 * graphs cheap to store and fast to walk on ordinary machines.
 *
 * Copyright (c) 2025, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::Graph,
    crate::{
        chk,
        error::{CorruptKind, GraphError, RuntimeResult},
        storage::{record::SlotKind, spec::Settings},
        util::test_utils::TestFile,
    },
    rand::{distributions::Alphanumeric, rngs::StdRng, Rng, SeedableRng},
    std::collections::HashSet,
};

fn open_new(name: &str, settings: Settings) -> (TestFile, Graph) {
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new(name);
    let g = Graph::create(tf.path(), settings).unwrap();
    (tf, g)
}

fn small(name: &str) -> (TestFile, Graph) {
    open_new(name, Settings::new(16, 4))
}

fn sorted_keys(iter: impl Iterator<Item = RuntimeResult<String>>) -> Vec<String> {
    let mut v: Vec<String> = iter.collect::<RuntimeResult<_>>().unwrap();
    v.sort();
    v
}

fn node_keys(g: &Graph) -> Vec<String> {
    let mut v: Vec<String> = g
        .nodes()
        .map(|r| r.map(|n| n.key))
        .collect::<RuntimeResult<_>>()
        .unwrap();
    v.sort();
    v
}

fn assert_clean(g: &Graph) {
    let report = chk::check(g).unwrap();
    assert!(report.is_clean(), "{report}");
}

/*
    the walkthrough scenarios
*/

#[test]
fn fresh_graph_add_and_iterate() {
    let (_tf, mut g) = small("fresh_graph");
    assert_eq!(g.add_node("A").unwrap(), 0);
    assert_eq!(g.add_node("B").unwrap(), 1);
    assert_eq!(g.add_node("C").unwrap(), 2);
    assert_eq!(node_keys(&g), ["A", "B", "C"]);
    assert_eq!(g.node_count(), 3);
    assert_eq!(g.edge_count(), 0);
    assert_clean(&g);
}

#[test]
fn adjacency_both_directions() {
    let (_tf, mut g) = small("adjacency_basic");
    for k in ["A", "B", "C"] {
        g.add_node(k).unwrap();
    }
    g.add_edge("A", "B").unwrap();
    g.add_edge("A", "C").unwrap();
    assert_eq!(sorted_keys(g.neighbors("A").unwrap()), ["B", "C"]);
    assert_eq!(sorted_keys(g.predecessors("B").unwrap()), ["A"]);
    assert_eq!(sorted_keys(g.predecessors("C").unwrap()), ["A"]);
    assert_eq!(sorted_keys(g.neighbors("B").unwrap()), Vec::<String>::new());
    assert_eq!(g.edge_count(), 2);
    let mut pairs: Vec<(String, String)> = g
        .edges()
        .map(|r| r.map(|e| (e.source, e.target)))
        .collect::<RuntimeResult<_>>()
        .unwrap();
    pairs.sort();
    assert_eq!(
        pairs,
        [
            ("A".to_owned(), "B".to_owned()),
            ("A".to_owned(), "C".to_owned())
        ]
    );
    assert_clean(&g);
}

#[test]
fn node_removal_cascades() {
    let (_tf, mut g) = small("removal_cascades");
    for k in ["A", "B", "C"] {
        g.add_node(k).unwrap();
    }
    g.add_edge("A", "B").unwrap();
    g.add_edge("A", "C").unwrap();
    g.remove_node("C").unwrap();
    assert_eq!(sorted_keys(g.neighbors("A").unwrap()), ["B"]);
    assert!(!g.has_edge("A", "C").unwrap());
    assert!(!g.has_node("C").unwrap());
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);
    // the node slot and the edge slot both went to the freelist
    let report = chk::check(&g).unwrap();
    assert!(report.is_clean(), "{report}");
    assert_eq!(report.scanned_free, 2);
}

#[test]
fn duplicate_key_is_rejected_without_side_effects() {
    let (_tf, mut g) = small("duplicate_key");
    let id = g.add_node("X").unwrap();
    for _ in 0..5 {
        assert_eq!(g.add_node("X").unwrap_err(), GraphError::AlreadyExists);
    }
    assert_eq!(g.node_count(), 1);
    // no ids were burned on the failed attempts
    assert_eq!(g.add_node("Y").unwrap(), id + 1);
    assert_clean(&g);
}

#[test]
fn removing_an_absent_edge_changes_nothing() {
    let (_tf, mut g) = small("absent_edge");
    g.add_node("A").unwrap();
    g.add_node("B").unwrap();
    assert_eq!(g.remove_edge("A", "B").unwrap_err(), GraphError::NotFound);
    assert_eq!(g.remove_edge("A", "Z").unwrap_err(), GraphError::NotFound);
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 0);
    assert_clean(&g);
}

#[test]
fn bulk_random_keys_stay_shallow() {
    let (_tf, mut g) = open_new("bulk_random", Settings::new(1024, 20));
    let mut rng = StdRng::seed_from_u64(0x5AD_BEEF);
    let mut keys: HashSet<String> = HashSet::new();
    while keys.len() < 10_000 {
        let key: String = (0..20).map(|_| rng.sample(Alphanumeric) as char).collect();
        keys.insert(key);
    }
    for key in &keys {
        g.add_node(key).unwrap();
    }
    assert_eq!(g.node_count(), 10_000);
    for key in &keys {
        assert!(g.has_node(key).unwrap(), "lost {key}");
    }
    let iterated: HashSet<String> = g
        .nodes()
        .map(|r| r.map(|n| n.key))
        .collect::<RuntimeResult<_>>()
        .unwrap();
    assert_eq!(iterated, keys);
    let report = chk::check(&g).unwrap();
    assert!(report.is_clean(), "{report}");
    // the bucket fan-out is the balancing strategy; with 1024 buckets over 10k keys
    // the trees must stay shallow
    let bound = 2.0 * (10_000f64 / 1024.0).log2() + 4.0;
    assert!(
        report.avg_key_depth() <= bound,
        "mean depth {} exceeds {bound}",
        report.avg_key_depth()
    );
}

/*
    edges: loops, auto-creation, duplicates
*/

#[test]
fn self_loops_live_in_both_trees_and_die_once() {
    let (_tf, mut g) = small("self_loop");
    g.add_node("A").unwrap();
    g.add_edge("A", "A").unwrap();
    assert_eq!(sorted_keys(g.neighbors("A").unwrap()), ["A"]);
    assert_eq!(sorted_keys(g.predecessors("A").unwrap()), ["A"]);
    assert_eq!(g.edge_count(), 1);
    assert_clean(&g);
    g.remove_edge("A", "A").unwrap();
    assert_eq!(g.edge_count(), 0);
    assert_eq!(sorted_keys(g.neighbors("A").unwrap()), Vec::<String>::new());
    assert_clean(&g);
    // and through the cascade path too
    g.add_edge("A", "A").unwrap();
    g.add_edge("A", "B").unwrap();
    g.remove_node("A").unwrap();
    assert_eq!(g.node_count(), 1);
    assert_eq!(g.edge_count(), 0);
    assert_clean(&g);
}

#[test]
fn edge_insert_auto_creates_endpoints() {
    let (_tf, mut g) = small("auto_create");
    g.add_edge("u", "v").unwrap();
    assert!(g.has_node("u").unwrap());
    assert!(g.has_node("v").unwrap());
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 1);
    assert_eq!(g.add_edge("u", "v").unwrap_err(), GraphError::AlreadyExists);
    assert_eq!(g.edge_count(), 1);
    // reversed direction is a different edge
    g.add_edge("v", "u").unwrap();
    assert_eq!(g.edge_count(), 2);
    assert_clean(&g);
}

#[test]
fn out_tree_survives_arbitrary_edge_removal_order() {
    let (_tf, mut g) = open_new("edge_removal_order", Settings::new(4, 8));
    let targets = [
        "ta", "tb", "tc", "td", "te", "tf", "tg", "th", "ti", "tj", "tk", "tl",
    ];
    for t in targets {
        g.add_edge("hub", t).unwrap();
    }
    assert_eq!(g.edge_count(), 12);
    // remove from the middle out, hitting leaves, single-child and two-children
    // spots in whatever order the hashes shaped the tree
    for (i, t) in [
        "tf", "ta", "tl", "tg", "tb", "tk", "tc", "tj", "td", "ti", "te", "th",
    ]
    .iter()
    .enumerate()
    {
        g.remove_edge("hub", t).unwrap();
        assert!(!g.has_edge("hub", t).unwrap());
        assert_eq!(g.edge_count(), 12 - i as u64 - 1);
        assert_clean(&g);
    }
    assert_eq!(sorted_keys(g.neighbors("hub").unwrap()), Vec::<String>::new());
}

#[test]
fn in_tree_survives_arbitrary_edge_removal_order() {
    let (_tf, mut g) = open_new("in_removal_order", Settings::new(4, 8));
    let sources = ["sa", "sb", "sc", "sd", "se", "sf", "sg", "sh"];
    for s in sources {
        g.add_edge(s, "sink").unwrap();
    }
    for (i, s) in ["sd", "sa", "sh", "sb", "sg", "sc", "sf", "se"]
        .iter()
        .enumerate()
    {
        g.remove_edge(s, "sink").unwrap();
        assert_eq!(g.edge_count(), 8 - i as u64 - 1);
        assert_clean(&g);
    }
    assert_eq!(
        sorted_keys(g.predecessors("sink").unwrap()),
        Vec::<String>::new()
    );
}

/*
    the hard case: key-tree copy-up while the relocated node carries live edges
*/

#[test]
fn copy_up_keeps_the_successors_edges_resolvable() {
    // one bucket, so all keys share a tree and removals relocate records
    let (_tf, mut g) = open_new("copy_up_edges", Settings::new(1, 12));
    let keys = [
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
        "juliett", "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo",
        "sierra", "tango", "uniform", "victor", "whiskey", "xray", "yankee", "zulu",
    ];
    for k in keys {
        g.add_node(k).unwrap();
    }
    // a ring, so every node has an out-edge and an in-edge
    for w in keys.windows(2) {
        g.add_edge(w[0], w[1]).unwrap();
    }
    g.add_edge(keys[keys.len() - 1], keys[0]).unwrap();
    assert_clean(&g);
    // find a key whose record has two children in the bucket tree; removing it is
    // the copy-up path, and the relocated successor carries ring edges
    let mut victim = None;
    for pos in 1..g.file().state().tail {
        if g.file().read_kind(pos).unwrap() != SlotKind::Node {
            continue;
        }
        let n = g.file().read_node(pos).unwrap();
        if n.left != 0 && n.right != 0 {
            victim = Some(String::from_utf8(n.key).unwrap());
            break;
        }
    }
    let victim = victim.expect("no two-children node in a 26-key tree");
    g.remove_node(&victim).unwrap();
    assert_eq!(g.node_count(), 25);
    assert_eq!(g.edge_count(), 24);
    assert_clean(&g);
    // every surviving ring edge still resolves from both ends
    let survivors: Vec<&str> = keys.iter().copied().filter(|k| *k != victim).collect();
    for w in keys.windows(2) {
        let expect = w[0] != victim && w[1] != victim;
        assert_eq!(g.has_edge(w[0], w[1]).unwrap_or(false), expect);
    }
    for s in &survivors {
        for n in g.neighbors(s).unwrap() {
            n.unwrap();
        }
        for p in g.predecessors(s).unwrap() {
            p.unwrap();
        }
    }
    // and tear the rest down through every structural case
    for k in survivors {
        g.remove_node(k).unwrap();
        assert_clean(&g);
    }
    assert_eq!(g.node_count(), 0);
    assert_eq!(g.edge_count(), 0);
}

/*
    attributes
*/

#[test]
fn attribute_round_trip_and_size_checks() {
    let (_tf, mut g) = open_new("attrs", Settings::new(8, 8).with_attrs(8, 4));
    g.add_node_with("a", &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    assert_eq!(g.get_node("a").unwrap().attrs, [1, 2, 3, 4, 5, 6, 7, 8]);
    // plain insert zeroes the region
    g.add_node("b").unwrap();
    assert_eq!(g.get_node("b").unwrap().attrs, [0; 8]);
    g.set_node("b", &[9; 8]).unwrap();
    assert_eq!(g.get_node("b").unwrap().attrs, [9; 8]);
    assert_eq!(
        g.add_node_with("c", &[1, 2]).unwrap_err(),
        GraphError::AttrSizeMismatch
    );
    assert_eq!(
        g.set_node("b", &[1, 2]).unwrap_err(),
        GraphError::AttrSizeMismatch
    );
    g.add_edge_with("a", "b", 7, &[4, 3, 2, 1]).unwrap();
    let e = g.get_edge("a", "b").unwrap();
    assert_eq!(e.tag, 7);
    assert_eq!(e.attrs, [4, 3, 2, 1]);
    g.set_edge("a", "b", &[0xFF; 4]).unwrap();
    assert_eq!(g.get_edge("a", "b").unwrap().attrs, [0xFF; 4]);
    assert_eq!(
        g.set_edge("a", "b", &[1]).unwrap_err(),
        GraphError::AttrSizeMismatch
    );
    // attribute writes touch nothing structural
    assert_clean(&g);
}

/*
    key validation at the public surface
*/

#[test]
fn key_rules_are_enforced() {
    let (_tf, mut g) = small("key_rules");
    assert_eq!(g.add_node("").unwrap_err(), GraphError::InvalidKey);
    assert_eq!(g.add_node("a\0b").unwrap_err(), GraphError::InvalidKey);
    assert_eq!(g.add_node("12345").unwrap_err(), GraphError::KeyTooLong);
    assert_eq!(g.has_node("12345").unwrap_err(), GraphError::KeyTooLong);
    // exactly max_key_len is fine: the key field has no terminator then
    g.add_node("1234").unwrap();
    assert!(g.has_node("1234").unwrap());
    assert_eq!(g.get_node("1234").unwrap().key, "1234");
    assert_clean(&g);
}

#[test]
fn missing_references_are_not_found() {
    let (_tf, mut g) = small("missing_refs");
    g.add_node("A").unwrap();
    assert_eq!(g.get_node("Z").unwrap_err(), GraphError::NotFound);
    assert_eq!(g.get_edge("A", "Z").unwrap_err(), GraphError::NotFound);
    assert_eq!(g.remove_node("Z").unwrap_err(), GraphError::NotFound);
    assert!(matches!(
        g.neighbors("Z").unwrap_err(),
        GraphError::NotFound
    ));
    assert!(matches!(
        g.predecessors("Z").unwrap_err(),
        GraphError::NotFound
    ));
    assert!(!g.has_edge("A", "Z").unwrap());
    assert!(!g.has_edge("Z", "A").unwrap());
}

/*
    persistence and open modes
*/

#[test]
fn state_survives_close_and_reopen() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("persistence");
    {
        let mut g = Graph::create(tf.path(), Settings::new(16, 4)).unwrap();
        for k in ["A", "B", "C"] {
            g.add_node(k).unwrap();
        }
        g.add_edge("A", "B").unwrap();
        g.add_edge("C", "A").unwrap();
        g.flush().unwrap();
        g.close().unwrap();
    }
    let g = Graph::open_rw(tf.path()).unwrap();
    assert_eq!(g.node_count(), 3);
    assert_eq!(g.edge_count(), 2);
    assert_eq!(node_keys(&g), ["A", "B", "C"]);
    assert!(g.has_edge("A", "B").unwrap());
    assert!(g.has_edge("C", "A").unwrap());
    assert!(!g.has_edge("B", "A").unwrap());
    assert_eq!(sorted_keys(g.neighbors("A").unwrap()), ["B"]);
    assert_eq!(sorted_keys(g.predecessors("A").unwrap()), ["C"]);
    assert_clean(&g);
}

#[test]
fn read_only_handles_reject_mutation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("read_only");
    {
        let mut g = Graph::create(tf.path(), Settings::new(16, 4)).unwrap();
        g.add_edge("A", "B").unwrap();
        g.close().unwrap();
    }
    let mut g = Graph::open_ro(tf.path()).unwrap();
    assert_eq!(g.add_node("C").unwrap_err(), GraphError::ReadOnly);
    assert_eq!(g.add_edge("A", "C").unwrap_err(), GraphError::ReadOnly);
    assert_eq!(g.remove_node("A").unwrap_err(), GraphError::ReadOnly);
    assert_eq!(g.remove_edge("A", "B").unwrap_err(), GraphError::ReadOnly);
    assert_eq!(g.set_node("A", &[]).unwrap_err(), GraphError::ReadOnly);
    assert_eq!(g.set_edge("A", "B", &[]).unwrap_err(), GraphError::ReadOnly);
    // reads and the consistency pass still work
    assert!(g.has_edge("A", "B").unwrap());
    assert_eq!(node_keys(&g), ["A", "B"]);
    assert_clean(&g);
    g.flush().unwrap();
}

#[cfg(unix)]
#[test]
fn second_writer_is_locked_out() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("writer_lock");
    let g = Graph::create(tf.path(), Settings::new(4, 4)).unwrap();
    match Graph::open_rw(tf.path()) {
        Err(GraphError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::AlreadyExists),
        other => panic!("expected the lock to hold, got {other:?}"),
    }
    // readers are not excluded
    Graph::open_ro(tf.path()).unwrap();
    drop(g);
    // the lock dies with the descriptor
    Graph::open_rw(tf.path()).unwrap();
}

#[test]
fn add_remove_leaves_the_file_byte_identical() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("byte_identical");
    let mut g = Graph::create(tf.path(), Settings::new(16, 4)).unwrap();
    g.add_node("A").unwrap();
    g.add_node("B").unwrap();
    g.flush().unwrap();
    let before = std::fs::read(tf.path()).unwrap();
    let nodes_before = g.node_count();
    g.add_node("X").unwrap();
    g.remove_node("X").unwrap();
    g.flush().unwrap();
    let after = std::fs::read(tf.path()).unwrap();
    assert_eq!(g.node_count(), nodes_before);
    assert_eq!(before.len(), after.len());
    // the dynamic block moved (next id, freelist head) and the recycled slot is now
    // a tombstone; every other byte must be untouched
    let s = *g.settings();
    let slot = s.slot_offset(3) as usize;
    let slot_end = slot + s.record_size() as usize;
    assert_eq!(before[..64], after[..64], "static block changed");
    assert_eq!(before[128..slot], after[128..slot], "directory or slots changed");
    assert_eq!(before[slot_end..], after[slot_end..], "trailing slots changed");
    assert_clean(&g);
}

#[test]
fn reopen_rejects_a_damaged_header() {
    use std::{fs, io::{Seek, SeekFrom, Write}};
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("damaged_header");
    {
        let mut g = Graph::create(tf.path(), Settings::new(4, 4)).unwrap();
        g.add_node("A").unwrap();
        g.close().unwrap();
    }
    // magic
    {
        let mut f = fs::OpenOptions::new().write(true).open(tf.path()).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(b"not a graph!").unwrap();
    }
    assert_eq!(
        Graph::open_rw(tf.path()).unwrap_err(),
        GraphError::Corrupted(CorruptKind::HeaderMagic)
    );
}

#[test]
fn reopen_rejects_a_torn_dynamic_block() {
    use std::{fs, io::{Seek, SeekFrom, Write}};
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("torn_dyn_block");
    {
        let mut g = Graph::create(tf.path(), Settings::new(4, 4)).unwrap();
        g.add_node("A").unwrap();
        g.close().unwrap();
    }
    {
        let mut f = fs::OpenOptions::new().write(true).open(tf.path()).unwrap();
        // flip a counter byte without fixing the CRC
        f.seek(SeekFrom::Start(64)).unwrap();
        f.write_all(&[0x7F]).unwrap();
    }
    assert_eq!(
        Graph::open_rw(tf.path()).unwrap_err(),
        GraphError::Corrupted(CorruptKind::HeaderChecksum)
    );
}

#[test]
fn chk_reports_slot_damage() {
    use std::{fs, io::{Seek, SeekFrom, Write}};
    let _ = env_logger::builder().is_test(true).try_init();
    let tf = TestFile::new("chk_damage");
    let s = Settings::new(4, 4);
    {
        let mut g = Graph::create(tf.path(), s).unwrap();
        g.add_edge("A", "B").unwrap();
        g.close().unwrap();
    }
    {
        // stamp an unknown kind onto the first node slot
        let mut f = fs::OpenOptions::new().write(true).open(tf.path()).unwrap();
        f.seek(SeekFrom::Start(s.slot_offset(1))).unwrap();
        f.write_all(&[0xEE]).unwrap();
    }
    let g = Graph::open_ro(tf.path()).unwrap();
    let report = chk::check(&g).unwrap();
    assert!(!report.is_clean());
}

/*
    randomized churn
*/

#[test]
fn random_churn_holds_every_invariant() {
    let (_tf, mut g) = open_new("random_churn", Settings::new(8, 8));
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let pool: Vec<String> = (0..24).map(|i| format!("k{i:02}")).collect();
    for round in 0..600u32 {
        let a = &pool[rng.gen_range(0..pool.len())];
        let b = &pool[rng.gen_range(0..pool.len())];
        match rng.gen_range(0..100) {
            0..=24 => match g.add_node(a) {
                Ok(_) | Err(GraphError::AlreadyExists) => {}
                Err(e) => panic!("add_node({a}): {e}"),
            },
            25..=59 => match g.add_edge(a, b) {
                Ok(()) | Err(GraphError::AlreadyExists) => {}
                Err(e) => panic!("add_edge({a}, {b}): {e}"),
            },
            60..=74 => match g.remove_edge(a, b) {
                Ok(()) | Err(GraphError::NotFound) => {}
                Err(e) => panic!("remove_edge({a}, {b}): {e}"),
            },
            75..=89 => match g.remove_node(a) {
                Ok(()) | Err(GraphError::NotFound) => {}
                Err(e) => panic!("remove_node({a}): {e}"),
            },
            _ => {
                let have = g.has_node(a).unwrap();
                assert_eq!(g.get_node(a).is_ok(), have);
            }
        }
        if round % 50 == 0 {
            assert_clean(&g);
        }
    }
    assert_clean(&g);
    // counters agree with full iteration
    assert_eq!(g.node_count(), g.nodes().count() as u64);
    assert_eq!(g.edge_count(), g.edges().count() as u64);
}
