use graphql_parser::parse_query;
use normalized_cache::{root_query_key, Cache};
use pretty_assertions::assert_eq;

fn doc(text: &str) -> normalized_cache::Document {
    parse_query::<String>(text).unwrap().into_static()
}

#[test]
fn adding_two_layers_then_removing_both_in_either_order_restores_the_base_state() {
    let cache = Cache::new();
    cache.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 1})).unwrap();
    let base = cache.extract(true);

    cache.record_optimistic_transaction(
        |write| write.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 2})),
        "a",
    );
    cache.record_optimistic_transaction(
        |write| write.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 3})),
        "b",
    );

    cache.remove_optimistic("a");
    cache.remove_optimistic("b");

    assert_eq!(cache.extract(true), base, "removing both layers (a then b) must restore the pre-layer state");
}

#[test]
fn removal_order_does_not_affect_the_final_state() {
    let cache = Cache::new();
    cache.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 1})).unwrap();
    let base = cache.extract(true);

    cache.record_optimistic_transaction(
        |write| write.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 2})),
        "a",
    );
    cache.record_optimistic_transaction(
        |write| write.write(&doc("{ v }"), &serde_json::json!({}), &root_query_key(), &serde_json::json!({"v": 3})),
        "b",
    );

    cache.remove_optimistic("b");
    cache.remove_optimistic("a");

    assert_eq!(cache.extract(true), base, "removing both layers (b then a) must also restore the pre-layer state");
}
