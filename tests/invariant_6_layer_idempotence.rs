use graphql_parser::parse_query;
use normalized_cache::{root_query_key, Cache};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn doc(text: &str) -> normalized_cache::Document {
    parse_query::<String>(text).unwrap().into_static()
}

#[test]
fn adding_then_immediately_removing_a_layer_restores_the_exact_extracted_state() {
    let cache = Cache::new();
    cache.write(&doc("{ v unrelated }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 1, "unrelated": 1})).unwrap();
    let before = cache.extract(true);

    let fired = Rc::new(RefCell::new(0));
    let fired_clone = Rc::clone(&fired);
    let handle = cache.watch(
        Rc::new(doc("{ unrelated }")),
        serde_json::json!({}),
        root_query_key(),
        true,
        Box::new(move |_diff| *fired_clone.borrow_mut() += 1),
    );
    let baseline = *fired.borrow();

    cache.record_optimistic_transaction(
        |write| write.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 2})),
        "layer",
    );
    cache.remove_optimistic("layer");

    assert_eq!(cache.extract(true), before);
    assert_eq!(*fired.borrow(), baseline, "a watch whose data was never touched by the layer must not fire across add+remove");

    handle.dispose();
}
