//! Cache accounting and invalidation, observed through real requests.

use super::{entries, get_ok, handler, new_log, recorder};
use crate::{Arg, CacheStats, Config, Controller};

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .middleware([recorder(&log, "global")])
        .unwrap()
        .define_handler("act", handler(&log, "handler"))
        .unwrap()
        .get("/act", "act")
        .unwrap();
    let app = controller.router();

    get_ok(&app, "/act").await;
    get_ok(&app, "/act").await;

    assert_eq!(
        controller.cache_stats(),
        CacheStats {
            hits: 1,
            misses: 1,
            entries: 1
        }
    );
    assert_eq!(
        entries(&log),
        vec!["global", "handler", "global", "handler"]
    );
}

#[test]
fn test_chain_for_is_idempotent() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .middleware([recorder(&log, "one"), recorder(&log, "two")])
        .unwrap()
        .define("act", ["g"], handler(&log, "handler"))
        .unwrap();

    let first = controller.chain_for("act");
    let second = controller.chain_for("act");
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(controller.cache_stats(), CacheStats::default());
}

#[tokio::test]
async fn test_registration_purges_only_intersecting_scopes() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .define("a", ["g"], handler(&log, "a"))
        .unwrap()
        .define("b", ["h"], handler(&log, "b"))
        .unwrap()
        .get("/a", "a")
        .unwrap()
        .get("/b", "b")
        .unwrap();
    let app = controller.router();

    get_ok(&app, "/a").await;
    get_ok(&app, "/b").await;
    assert_eq!(controller.cache_stats().entries, 2);

    controller
        .middleware([Arg::group("g"), Arg::middleware(recorder(&log, "late"))])
        .unwrap();
    assert_eq!(controller.cache_stats().entries, 1);

    // "/b" still hits, "/a" resolves again and picks up the new middleware
    get_ok(&app, "/b").await;
    get_ok(&app, "/a").await;

    let stats = controller.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert_eq!(entries(&log), vec!["a", "b", "b", "late", "a"]);
}

#[tokio::test]
async fn test_global_registration_purges_every_entry() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .define("a", ["g"], handler(&log, "a"))
        .unwrap()
        .define_handler("b", handler(&log, "b"))
        .unwrap()
        .get("/a", "a")
        .unwrap()
        .get("/b", "b")
        .unwrap();
    let app = controller.router();

    get_ok(&app, "/a").await;
    get_ok(&app, "/b").await;
    controller.middleware([recorder(&log, "global")]).unwrap();

    assert_eq!(controller.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_parent_registration_purges_descendant_caches() {
    let log = new_log();
    let parent = Controller::new();
    let child = Controller::new();
    let grandchild = Controller::new();
    grandchild
        .define("leaf", ["g"], handler(&log, "leaf"))
        .unwrap()
        .get("/leaf", "leaf")
        .unwrap();
    child.mount("/inner", &grandchild).unwrap();
    parent.mount("/outer", &child).unwrap();
    let app = parent.router();

    get_ok(&app, "/outer/inner/leaf").await;
    assert_eq!(grandchild.cache_stats().entries, 1);

    parent
        .middleware([Arg::group("g"), Arg::middleware(recorder(&log, "parent-g"))])
        .unwrap();
    assert_eq!(grandchild.cache_stats().entries, 0);

    get_ok(&app, "/outer/inner/leaf").await;
    assert_eq!(entries(&log), vec!["leaf", "parent-g", "leaf"]);
}

#[tokio::test]
async fn test_mounting_drops_chains_cached_before_mount() {
    let log = new_log();
    let parent = Controller::new();
    let child = Controller::new();
    parent.middleware([recorder(&log, "parent")]).unwrap();
    child
        .define_handler("act", handler(&log, "handler"))
        .unwrap()
        .get("/act", "act")
        .unwrap();

    get_ok(&child.router(), "/act").await;
    assert_eq!(child.cache_stats().entries, 1);

    parent.mount("/child", &child).unwrap();
    assert_eq!(child.cache_stats().entries, 0);

    get_ok(&parent.router(), "/child/act").await;
    assert_eq!(entries(&log), vec!["handler", "parent", "handler"]);
}

#[tokio::test]
async fn test_disabled_cache_resolves_every_request() {
    let log = new_log();
    let config = Config::default().with_chain_cache(false);
    let controller = Controller::with_config(&config);
    controller
        .middleware([recorder(&log, "global")])
        .unwrap()
        .define_handler("act", handler(&log, "handler"))
        .unwrap()
        .get("/act", "act")
        .unwrap();
    let app = controller.router();

    for _ in 0..3 {
        get_ok(&app, "/act").await;
    }

    assert_eq!(
        controller.cache_stats(),
        CacheStats {
            hits: 0,
            misses: 3,
            entries: 0
        }
    );
}

#[tokio::test]
async fn test_routes_sharing_scope_but_not_path_are_cached_separately() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .define_handler("act", handler(&log, "handler"))
        .unwrap()
        .get("/one", "act")
        .unwrap()
        .get("/two", "act")
        .unwrap();
    let app = controller.router();

    get_ok(&app, "/one").await;
    get_ok(&app, "/two").await;
    get_ok(&app, "/one").await;

    let stats = controller.cache_stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_redefinition_with_new_groups_drops_old_scope_entry() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .define("act", ["old"], handler(&log, "first"))
        .unwrap()
        .get("/act", "act")
        .unwrap();
    let app = controller.router();

    get_ok(&app, "/act").await;
    assert_eq!(controller.cache_stats().entries, 1);

    controller
        .define("act", ["new"], handler(&log, "second"))
        .unwrap();
    assert_eq!(controller.cache_stats().entries, 0);

    get_ok(&app, "/act").await;
    assert_eq!(controller.cache_stats().entries, 1);
    assert_eq!(entries(&log), vec!["first", "second"]);
}

#[tokio::test]
async fn test_redefinition_with_same_groups_keeps_entry() {
    let log = new_log();
    let controller = Controller::new();
    controller
        .define("act", ["g"], handler(&log, "first"))
        .unwrap()
        .get("/act", "act")
        .unwrap();
    let app = controller.router();

    get_ok(&app, "/act").await;
    controller.define("act", ["g"], handler(&log, "second")).unwrap();

    get_ok(&app, "/act").await;
    assert_eq!(controller.cache_stats().hits, 1);
}
