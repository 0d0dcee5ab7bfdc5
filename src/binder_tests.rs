#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use rstest::rstest;
    use serde_json::{json, Value};

    use crate::binder::TemplateBinder;
    use crate::dom::{Document, NodeId, SharedDocument};
    use crate::options::RuntimeOptions;
    use crate::parse::parse_template;
    use crate::path;
    use crate::path::Path;
    use crate::registry::SubscriptionRegistry;
    use crate::scheduler::EventScheduler;
    use crate::store::Store;

    struct Fixture {
        binder: TemplateBinder,
        scheduler: Rc<EventScheduler>,
        doc: SharedDocument,
    }

    impl Fixture {
        fn new(state: Value) -> Self {
            let scheduler = Rc::new(EventScheduler::new());
            let store = Store::new(
                state,
                Rc::new(SubscriptionRegistry::new()),
                scheduler.clone(),
            );
            let doc = Document::shared();
            let binder =
                TemplateBinder::new(doc.clone(), store, Rc::new(RuntimeOptions::default()));
            Self {
                binder,
                scheduler,
                doc,
            }
        }

        fn render(&self, markup: &str) -> Vec<NodeId> {
            let fragment = parse_template(markup, "test").unwrap();
            let root = self.doc.borrow().root();
            fragment
                .nodes
                .iter()
                .map(|node| self.binder.bind(node, root, &Path::root()))
                .collect()
        }

        fn store(&self) -> &Store {
            self.binder.store()
        }

        fn frame(&self) -> usize {
            self.scheduler.flush()
        }

        fn html(&self) -> String {
            let doc = self.doc.borrow();
            doc.to_html(doc.root())
        }

        fn tagged(&self, tag: &str) -> Vec<NodeId> {
            let doc = self.doc.borrow();
            doc.elements_by_tag(doc.root(), tag)
        }

        fn texts(&self) -> Vec<String> {
            let doc = self.doc.borrow();
            doc.text_nodes(doc.root())
                .into_iter()
                .filter_map(|id| doc.text(id).map(str::to_string))
                .collect()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIST REGIONS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_list_renders_in_order_and_push_keeps_identities() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }] }));
        f.render(r#"<ul><li for="items">{n}</li></ul>"#);
        assert_eq!(f.html(), "<ul><li>a</li><li>b</li></ul>");
        assert_eq!(f.texts(), vec!["a", "b"]);

        let before_items = f.tagged("li");
        let before_texts = f.doc.borrow().text_nodes(f.doc.borrow().root());

        f.store()
            .push(&path!["items"], vec![json!({ "n": "c" })])
            .unwrap();
        assert_eq!(f.html(), "<ul><li>a</li><li>b</li></ul>");
        f.frame();

        assert_eq!(f.html(), "<ul><li>a</li><li>b</li><li>c</li></ul>");
        let after_items = f.tagged("li");
        let after_texts = f.doc.borrow().text_nodes(f.doc.borrow().root());
        assert_eq!(after_items.len(), 3);
        assert_eq!(&after_items[..2], &before_items[..]);
        assert_eq!(&after_texts[..2], &before_texts[..]);
    }

    #[test]
    fn test_replacing_with_equal_array_is_idempotent() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }, { "n": "c" }] }));
        f.render(r#"<ol><li for="items" class="row">{n}</li></ol>"#);
        let before = f.html();

        f.store()
            .set(
                &path!["items"],
                json!([{ "n": "a" }, { "n": "b" }, { "n": "c" }]),
            )
            .unwrap();
        assert_eq!(f.frame(), 1);
        assert_eq!(f.html(), before);
        assert_eq!(f.tagged("li").len(), 3);
    }

    #[test]
    fn test_pop_truncates_without_touching_prefix() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }, { "n": "c" }] }));
        f.render(r#"<p for="items">{n}</p>"#);

        let before = f.tagged("p");
        let popped = f.store().pop(&path!["items"]).unwrap();
        assert_eq!(popped, Some(json!({ "n": "c" })));
        f.frame();
        assert_eq!(f.tagged("p"), before[..2].to_vec());
        assert_eq!(f.texts(), vec!["a", "b"]);
    }

    #[test]
    fn test_consecutive_pops_truncate_once() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }, { "n": "c" }] }));
        f.render(r#"<p for="items">{n}</p>"#);
        let first = f.tagged("p")[0];

        f.store().pop(&path!["items"]).unwrap();
        f.store().pop(&path!["items"]).unwrap();
        assert_eq!(f.frame(), 2);
        assert_eq!(f.tagged("p"), vec![first]);
        assert_eq!(f.store().registry().len(), 2);
    }

    #[test]
    fn test_pop_then_push_in_one_frame() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }] }));
        f.render(r#"<li for="items">{n}</li>"#);

        f.store().pop(&path!["items"]).unwrap();
        f.store()
            .push(&path!["items"], vec![json!({ "n": "x" }), json!({ "n": "y" })])
            .unwrap();
        assert_eq!(f.frame(), 2);
        assert_eq!(f.texts(), vec!["a", "x", "y"]);
    }

    #[rstest]
    #[case::unshift("unshift", vec!["z", "a", "b", "c"])]
    #[case::shift("shift", vec!["b", "c"])]
    #[case::splice("splice", vec!["a", "z", "c"])]
    #[case::sort("sort", vec!["c", "b", "a"])]
    #[case::delete("delete", vec!["a", "c"])]
    fn test_structural_changes_rebuild_in_index_order(
        #[case] op: &str,
        #[case] expected: Vec<&str>,
    ) {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }, { "n": "c" }] }));
        f.render(r#"<li for="items">{n}</li>"#);
        let items = path!["items"];
        let store = f.store();

        match op {
            "unshift" => {
                store.unshift(&items, vec![json!({ "n": "z" })]).unwrap();
            }
            "shift" => {
                store.shift(&items).unwrap();
            }
            "splice" => {
                store.splice(&items, 1, 1, vec![json!({ "n": "z" })]).unwrap();
            }
            "sort" => {
                store
                    .sort_by(&items, |a, b| b["n"].as_str().cmp(&a["n"].as_str()))
                    .unwrap();
            }
            "delete" => {
                store.delete(&path!["items", 1]).unwrap();
            }
            _ => unreachable!(),
        }
        f.frame();
        assert_eq!(f.texts(), expected);
    }

    #[test]
    fn test_element_replacement_rebinds_one_clone() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }, { "n": "c" }] }));
        f.render(r#"<li for="items">{n}</li>"#);
        let before = f.tagged("li");

        f.store()
            .set(&path!["items", 1], json!({ "n": "z" }))
            .unwrap();
        f.frame();

        let after = f.tagged("li");
        assert_eq!(f.texts(), vec!["a", "z", "c"]);
        assert_eq!(after[0], before[0]);
        assert_ne!(after[1], before[1]);
        assert_eq!(after[2], before[2]);
    }

    #[test]
    fn test_write_through_missing_element_leaves_region_in_sync() {
        let f = Fixture::new(json!({ "items": [] }));
        f.render(r#"<li for="items">{n}</li>"#);

        assert!(f.store().set(&path!["items", 0, "n"], json!("a")).is_err());
        assert_eq!(f.frame(), 0);
        assert_eq!(f.store().get(&path!["items"]), Some(json!([])));
        assert!(f.tagged("li").is_empty());

        f.store().set(&path!["items", 0], json!({ "n": "a" })).unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["a"]);
    }

    #[test]
    fn test_item_field_change_patches_text_only() {
        let f = Fixture::new(json!({ "items": [{ "n": "a" }, { "n": "b" }] }));
        f.render(r#"<li for="items">{n}</li>"#);
        let before = f.tagged("li");

        f.store().set(&path!["items", 0, "n"], json!("A")).unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["A", "b"]);
        assert_eq!(f.tagged("li"), before);
    }

    #[test]
    fn test_non_array_renders_nothing_until_assigned() {
        let f = Fixture::new(json!({ "items": "not a list" }));
        f.render(r#"<ul><li for="items">{n}</li></ul>"#);
        assert_eq!(f.html(), "<ul></ul>");

        f.store()
            .set(&path!["items"], json!([{ "n": "a" }]))
            .unwrap();
        f.frame();
        assert_eq!(f.html(), "<ul><li>a</li></ul>");
    }

    #[test]
    fn test_items_fall_back_to_outer_keys() {
        let f = Fixture::new(json!({
            "title": "Shop",
            "items": [{ "n": "a" }, { "n": "b", "title": "own" }]
        }));
        f.render(r#"<li for="items">{n}:{title}</li>"#);
        assert_eq!(f.texts(), vec!["a:Shop", "b:own"]);

        f.store().set(&path!["title"], json!("Store")).unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["a:Store", "b:own"]);
    }

    #[test]
    fn test_nested_regions() {
        let f = Fixture::new(json!({
            "groups": [
                { "name": "g1", "items": [{ "n": 1 }] },
                { "name": "g2", "items": [] }
            ]
        }));
        f.render(r#"<section for="groups"><h2>{name}</h2><p for="items">{n}</p></section>"#);
        assert_eq!(f.texts(), vec!["g1", "1", "g2"]);

        f.store()
            .push(&path!["groups", 1, "items"], vec![json!({ "n": 2 }), json!({ "n": 3 })])
            .unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["g1", "1", "g2", "2", "3"]);
    }

    #[test]
    fn test_region_teardown_releases_every_subscription() {
        let f = Fixture::new(json!({ "title": "t", "items": [{ "n": "a" }, { "n": "b" }] }));
        let nodes = f.render(r#"<li for="items">{n} {title}</li>"#);
        assert!(!f.store().registry().is_empty());

        for node in nodes {
            f.binder.teardown(node);
        }
        assert!(f.store().registry().is_empty());
        assert!(f.tagged("li").is_empty());
        assert_eq!(f.html(), "");
        assert_eq!(f.doc.borrow().live_count(), 1);

        f.store().push(&path!["items"], vec![json!({ "n": "c" })]).unwrap();
        f.frame();
        assert!(f.tagged("li").is_empty());
    }

    #[test]
    fn test_label_for_is_a_plain_attribute() {
        let f = Fixture::new(json!({ "text": "Name" }));
        f.render(r#"<label for="name">{text}</label>"#);
        assert_eq!(f.html(), r#"<label for="name">Name</label>"#);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SCOPES, TEXT, ATTRIBUTES
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_in_scope_applies_to_subtree_only() {
        let f = Fixture::new(json!({ "title": "T", "user": { "name": "ada" } }));
        f.render(r#"<div in="user"><p>{name} {title}</p></div><p>{name}</p>"#);
        assert_eq!(f.html(), "<div><p>ada T</p></div><p>{name}</p>");
    }

    #[test]
    fn test_batched_writes_settle_in_one_frame() {
        let f = Fixture::new(json!({ "count": 0 }));
        f.render("<span>{count}</span>");
        for n in 1..=3 {
            f.store().set(&path!["count"], json!(n)).unwrap();
        }
        assert_eq!(f.texts(), vec!["0"]);
        assert_eq!(f.frame(), 3);
        assert_eq!(f.texts(), vec!["3"]);
        assert_eq!(f.frame(), 0);
    }

    #[test]
    fn test_null_and_undefined_render_empty() {
        let f = Fixture::new(json!({ "a": "x", "b": "y" }));
        f.render("<p>[{a}][{b}]</p>");
        f.store().set(&path!["a"], Value::Null).unwrap();
        f.store().delete(&path!["b"]).unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["[][]"]);
    }

    #[rstest]
    #[case::empty_string(json!({ "v": "" }), None)]
    #[case::zero(json!({ "v": 0 }), None)]
    #[case::null(json!({ "v": null }), None)]
    #[case::false_(json!({ "v": false }), None)]
    #[case::string_zero(json!({ "v": "0" }), Some("0"))]
    #[case::text(json!({ "v": "on" }), Some("on"))]
    fn test_attribute_absence_policy(#[case] state: Value, #[case] expected: Option<&str>) {
        let f = Fixture::new(state);
        let nodes = f.render(r#"<input title="{v}">"#);
        assert_eq!(f.doc.borrow().attribute(nodes[0], "title"), expected);
    }

    #[test]
    fn test_attribute_removed_when_value_becomes_undefined() {
        let f = Fixture::new(json!({ "v": "on" }));
        let nodes = f.render(r#"<input title="{v}">"#);
        assert_eq!(f.doc.borrow().attribute(nodes[0], "title"), Some("on"));

        f.store().delete(&path!["v"]).unwrap();
        f.frame();
        assert_eq!(f.doc.borrow().attribute(nodes[0], "title"), None);
    }

    #[test]
    fn test_unresolved_lone_placeholder_keeps_literal() {
        let f = Fixture::new(json!({}));
        let nodes = f.render(r#"<a title="{missing}" class="x {missing}">{missing}</a>"#);
        assert_eq!(
            f.html(),
            r#"<a title="{missing}" class="x {missing}">{missing}</a>"#
        );

        // a later write at the local path resolves all three
        f.store().set(&path!["missing"], json!("here")).unwrap();
        f.frame();
        assert_eq!(f.doc.borrow().attribute(nodes[0], "title"), Some("here"));
        assert_eq!(f.html(), r#"<a title="here" class="x here">here</a>"#);
    }

    #[test]
    fn test_attribute_comes_back_when_truthy() {
        let f = Fixture::new(json!({ "v": "", "w": 0 }));
        let nodes = f.render(r#"<a href="{v}" class="n-{w}">x</a>"#);
        let a = nodes[0];
        assert_eq!(f.doc.borrow().attribute(a, "href"), None);
        assert_eq!(f.doc.borrow().attribute(a, "class"), Some("n-0"));

        f.store().set(&path!["v"], json!("/home")).unwrap();
        f.frame();
        assert_eq!(f.doc.borrow().attribute(a, "href"), Some("/home"));

        f.store().delete(&path!["v"]).unwrap();
        f.frame();
        assert_eq!(f.doc.borrow().attribute(a, "href"), None);
    }

    #[test]
    fn test_exact_path_binding_ignores_siblings_and_parents() {
        let f = Fixture::new(json!({ "user": { "name": "ada", "age": 36 } }));
        f.render(r#"<p in="user">{name}</p>"#);

        f.store().set(&path!["user", "age"], json!(37)).unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["ada"]);

        // replacing the parent object is not an event at user.name
        f.store()
            .set(&path!["user"], json!({ "name": "grace" }))
            .unwrap();
        f.frame();
        assert_eq!(f.texts(), vec!["ada"]);
        assert_eq!(f.store().get(&path!["user", "name"]), Some(json!("grace")));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HOOKS & MOUNTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_every_element_carries_state_hooks() {
        let f = Fixture::new(json!({ "items": [{ "n": 1 }] }));
        f.render(r#"<div><span for="items">{n}</span></div>"#);
        let doc = f.doc.borrow();
        for id in doc
            .elements_by_tag(doc.root(), "div")
            .into_iter()
            .chain(doc.elements_by_tag(doc.root(), "span"))
        {
            let hooks = doc.hooks(id).unwrap();
            assert!(hooks.state().ptr_eq(f.store()));
            assert!(hooks.open("other-card").is_none());
        }
    }

    #[test]
    fn test_component_hosts_are_reported_not_bound() {
        let f = Fixture::new(json!({ "people": [{ "profile": { "name": "ada" } }] }));
        f.render(
            r#"<ul><li for="people"><user-card state="profile" data-x="1"><b>{x}</b></user-card></li></ul>"#,
        );
        let mounts = f.binder.take_mounts();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].tag, "user-card");
        assert_eq!(mounts[0].scope, path!["people", 0]);
        assert_eq!(mounts[0].state_path, Some(path!["people", 0, "profile"]));

        let doc = f.doc.borrow();
        assert!(doc.children(mounts[0].host).is_empty());
        assert_eq!(doc.attribute(mounts[0].host, "data-x"), Some("1"));
        drop(doc);
        assert!(f.binder.take_mounts().is_empty());
    }
}
