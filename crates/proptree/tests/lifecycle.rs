//! File-backed lifecycle tests: load, reload-on-change, save, and the
//! notification ordering guarantees around `tick`.

use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use proptree::{ChangeFlags, Error, NodeId, NodeKind, PropertyTree};

fn write_config(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

/// Push the file's modification time forward so a change is always
/// observable regardless of filesystem timestamp granularity.
fn bump_mtime(path: &std::path::Path) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
}

fn assert_equivalent(a: &PropertyTree, a_id: NodeId, b: &PropertyTree, b_id: NodeId) {
    let an = a.node(a_id);
    let bn = b.node(b_id);
    assert_eq!(an.kind(), bn.kind(), "kind mismatch at `{}`", an.path());
    match an.kind() {
        NodeKind::Scalar => {
            assert_eq!(an.raw_value(), bn.raw_value(), "text mismatch at `{}`", an.path());
        }
        NodeKind::Map => {
            let a_keys: Vec<&str> = an.keys().collect();
            let b_keys: Vec<&str> = bn.keys().collect();
            assert_eq!(a_keys, b_keys, "key mismatch at `{}`", an.path());
            for key in a_keys {
                assert_equivalent(
                    a,
                    an.find_child(key).unwrap(),
                    b,
                    bn.find_child(key).unwrap(),
                );
            }
        }
        NodeKind::Array => {
            assert_eq!(an.child_count(), bn.child_count(), "len mismatch at `{}`", an.path());
            for i in 0..an.child_count() {
                assert_equivalent(a, an.find_index(i).unwrap(), b, bn.find_index(i).unwrap());
            }
        }
    }
}

#[test]
fn load_reads_typed_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "app.yaml",
        "window:\n  width: 1024\n  title: demo\nfullscreen: false\n",
    );

    let mut tree = PropertyTree::load(&path).unwrap();
    assert_eq!(tree.get_at("window.width", 0u32).unwrap(), 1024);
    assert_eq!(
        tree.get_at("window.title", String::new()).unwrap(),
        "demo"
    );
    assert!(!tree.get_at("fullscreen", true).unwrap());
    // Missing key falls back to the default and materializes the node.
    assert_eq!(tree.get_at("window.height", 768u32).unwrap(), 768);
    assert!(tree.has_key("window", "height"));
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.yaml");

    let mut tree = PropertyTree::new();
    tree.set_at("name", String::from("sandbox")).unwrap();
    tree.set_at("motd", String::from("hello world")).unwrap();
    tree.set_at("answer", String::from("yes")).unwrap();
    tree.set_at("limits.depth", 12i64).unwrap();
    tree.set_at("limits.ratio", 0.25f64).unwrap();
    tree.set_at("enabled", true).unwrap();
    let color = tree.node_at_path(tree.root(), "display.clear-color").unwrap();
    tree.set(color, [0.5f32, 0.25, 1.0]).unwrap();

    tree.save_to(&path, false).unwrap();
    let reloaded = PropertyTree::load(&path).unwrap();
    assert_equivalent(&tree, tree.root(), &reloaded, reloaded.root());
}

#[test]
fn vector_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vec.yaml");

    let mut tree = PropertyTree::new();
    let node = tree.node_at_path(tree.root(), "light.position").unwrap();
    tree.set(node, [1.0f32, 2.0, 3.0]).unwrap();
    tree.save_to(&path, false).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("position: [1, 2, 3]"), "got: {text}");

    let mut back = PropertyTree::load(&path).unwrap();
    let node = back.node_at_path(back.root(), "light.position").unwrap();
    assert_eq!(back.node(node).kind(), NodeKind::Array);
    assert_eq!(back.node(node).child_count(), 3);
    let value = back.get(node, [0.0f32, 0.0, 0.0]).unwrap();
    assert_eq!(value, [1.0, 2.0, 3.0]);
}

#[test]
fn reload_if_needed_detects_external_change() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "level: 1\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    assert_eq!(tree.get_at("level", 0i64).unwrap(), 1);
    assert!(!tree.reload_if_needed().unwrap());

    fs::write(&path, "level: 2\n").unwrap();
    bump_mtime(&path);

    let reloaded_flag = Rc::new(Cell::new(false));
    let flag = reloaded_flag.clone();
    tree.subscribe_reloaded(move |_| flag.set(true));

    assert!(tree.reload_if_needed().unwrap());
    assert!(reloaded_flag.get(), "reloaded notification fires inside reload");
    assert_eq!(tree.get_at("level", 0i64).unwrap(), 2);

    // Unchanged file: no further reload.
    assert!(!tree.reload_if_needed().unwrap());
}

#[test]
fn tick_reloads_then_drains() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "level: 1\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    tree.set_poll_interval(Duration::ZERO);
    let level = tree.node_at_path(tree.root(), "level").unwrap();
    assert_eq!(tree.get(level, 0i64).unwrap(), 1);
    tree.tick().unwrap(); // settle creation and type marks

    let observed: Rc<RefCell<Vec<i64>>> = Default::default();
    let sink = observed.clone();
    tree.subscribe(level, move |tree, event| {
        if event.flags.contains(ChangeFlags::VALUE) {
            let value = tree.get(event.node, 0i64).unwrap();
            sink.borrow_mut().push(value);
        }
    });

    fs::write(&path, "level: 7\n").unwrap();
    bump_mtime(&path);

    assert!(tree.tick().unwrap(), "tick performs the pending reload");
    // Reload happened before the drain, so the notification observed the
    // post-reload value.
    assert_eq!(observed.borrow().as_slice(), &[7]);
}

#[test]
fn reload_subscriber_can_remove_itself() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "level: 1\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    let count: Rc<Cell<u32>> = Default::default();
    let own_id: Rc<Cell<Option<proptree::SubscriberId>>> = Default::default();
    let counter = count.clone();
    let own = own_id.clone();
    let sid = tree.subscribe_reloaded(move |tree| {
        counter.set(counter.get() + 1);
        if let Some(sid) = own.get() {
            tree.unsubscribe(sid);
        }
    });
    own_id.set(Some(sid));

    fs::write(&path, "level: 2\n").unwrap();
    bump_mtime(&path);
    assert!(tree.reload_if_needed().unwrap());
    assert_eq!(count.get(), 1);

    fs::write(&path, "level: 3\n").unwrap();
    bump_mtime(&path);
    assert!(tree.reload_if_needed().unwrap());
    assert_eq!(count.get(), 1, "one-shot reload subscriber fired again");
}

#[test]
fn failed_reload_leaves_tree_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "a: 1\nb: 2\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    assert_eq!(tree.get_at("a", 0i64).unwrap(), 1);

    let reloaded_flag = Rc::new(Cell::new(false));
    let flag = reloaded_flag.clone();
    tree.subscribe_reloaded(move |_| flag.set(true));

    fs::write(&path, "a: [unclosed\nb: 2").unwrap();
    bump_mtime(&path);
    let err = tree.reload_if_needed().unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(!reloaded_flag.get(), "no reloaded notification on failure");
    assert_eq!(tree.get_at("a", 0i64).unwrap(), 1);
    assert_eq!(tree.get_at("b", 0i64).unwrap(), 2);

    fs::remove_file(&path).unwrap();
    let err = tree.reload_if_needed().unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(tree.get_at("a", 0i64).unwrap(), 1);
}

#[test]
fn stale_children_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "a: 1\nb: 2\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    fs::write(&path, "a: 10\n").unwrap();
    bump_mtime(&path);
    assert!(tree.reload_if_needed().unwrap());

    assert_eq!(tree.get_at("a", 0i64).unwrap(), 10);
    // `b` disappeared from the document but keeps its last state in memory.
    assert!(tree.has_key("", "b"));
    assert_eq!(tree.get_at("b", 0i64).unwrap(), 2);
}

#[test]
fn annotated_save_marks_unread_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "a: 1\nb: 2\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    let _ = tree.get_at("a", 0i64).unwrap();
    tree.save_with_annotations().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("a: 1\n"), "got: {text}");
    assert!(!text.contains("a: 1  # unread"), "got: {text}");
    assert!(text.contains("b: 2  # unread\n"), "got: {text}");
}

#[test]
fn presence_probe_does_not_materialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "app.yaml", "a: 1\n");

    let mut tree = PropertyTree::load(&path).unwrap();
    assert!(!tree.has_key("", "ghost"));
    assert!(!tree.has_path(tree.root(), "ghost.deep"));
    // The probes created nothing.
    assert!(!tree.has_key("", "ghost"));
    assert_eq!(tree.node(tree.root()).child_count(), 1);

    let _ = tree.get_at("ghost.deep", 0i64).unwrap();
    assert!(tree.has_path(tree.root(), "ghost.deep"));
}
