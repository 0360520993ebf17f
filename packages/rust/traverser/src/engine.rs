//! Bounded, breadth-first cross-container traversal.
//!
//! The traverser starts from a root container, rebuilds its item tree, and
//! schedules every distinct peer container referenced by a link, one level
//! deeper, until the depth bound is reached. Each container path is visited
//! at most once per run, at the depth it was first discovered.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use modexport_extract::{AttributeExtractor, HierarchyWalker};
use modexport_shared::{
    Container, ContainerAccessor, FlatRecord, Item, ModExportError, Result, TraversalConfig,
};

// ---------------------------------------------------------------------------
// Sinks and observers
// ---------------------------------------------------------------------------

/// Receives finished containers in completion order.
pub trait ContainerSink {
    fn accept(&mut self, container: Container);
}

impl ContainerSink for Vec<Container> {
    fn accept(&mut self, container: Container) {
        self.push(container);
    }
}

/// Progress callbacks. All methods default to no-ops.
pub trait TraversalObserver {
    /// A container was dequeued and is about to be opened.
    fn container_started(&self, _path: &str, _depth: u32, _remaining: usize) {}
    /// A container was exported.
    fn container_finished(&self, _container: &Container) {}
    /// A container could not be opened or read.
    fn container_skipped(&self, _path: &str, _error: &ModExportError) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl TraversalObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// TraversalReport
// ---------------------------------------------------------------------------

/// Summary of a completed traversal.
#[derive(Debug, Default)]
pub struct TraversalReport {
    /// Number of containers handed to the sink.
    pub containers_exported: usize,
    /// Containers that could not be opened or read.
    pub skipped: Vec<ModExportError>,
    /// Links dropped because an endpoint could not be resolved.
    pub link_warnings: Vec<ModExportError>,
    /// Referenced containers left out by the depth bound.
    pub beyond_depth: Vec<String>,
    /// Referenced containers left out by the include/exclude patterns.
    pub out_of_scope: Vec<String>,
    /// Queue entries dropped by cancellation.
    pub abandoned: usize,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
    /// Total duration of the traversal.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// ContainerTraverser
// ---------------------------------------------------------------------------

/// Sequential traverser over one accessor session.
pub struct ContainerTraverser<'a, A: ContainerAccessor> {
    accessor: &'a mut A,
    walker: HierarchyWalker,
    scope: TraversalScope,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, A: ContainerAccessor> ContainerTraverser<'a, A> {
    /// Create a traverser using the scope and attribute filters of `config`.
    pub fn new(accessor: &'a mut A, config: &TraversalConfig) -> Self {
        Self {
            accessor,
            walker: HierarchyWalker::new(AttributeExtractor::with_skipped(
                config.skip_attributes.iter().cloned(),
            )),
            scope: TraversalScope::new(config),
            cancel: None,
        }
    }

    /// Stop at the next queue boundary once `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Export `root` and every container reachable from it within `max_depth`
    /// levels (the root is the first level), feeding results to `sink`.
    ///
    /// Open and read failures skip that container only; the run always
    /// completes with a report.
    #[instrument(skip_all, fields(root = %root, max_depth = max_depth))]
    pub fn run(
        &mut self,
        root: &str,
        max_depth: u32,
        sink: &mut dyn ContainerSink,
        observer: &dyn TraversalObserver,
    ) -> TraversalReport {
        let start_time = Instant::now();

        let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(root.to_string(), 0)]);
        let mut report = TraversalReport::default();
        let mut beyond_depth = BTreeSet::new();
        let mut out_of_scope = BTreeSet::new();

        info!(max_depth, "starting traversal");

        while let Some((path, depth)) = queue.pop_front() {
            if self.cancelled() {
                report.cancelled = true;
                report.abandoned = queue.len() + 1;
                warn!(abandoned = report.abandoned, "traversal cancelled");
                break;
            }

            observer.container_started(&path, depth, queue.len());

            let (container, warnings) = match self.export_one(&path, depth) {
                Ok(done) => done,
                Err(e) => {
                    warn!(%path, depth, error = %e, "skipping container");
                    observer.container_skipped(&path, &e);
                    report.skipped.push(e);
                    continue;
                }
            };
            report.link_warnings.extend(warnings);

            for peer in peer_containers(&container.items) {
                if visited.contains(&peer) {
                    continue;
                }
                if !self.scope.in_scope(&peer) {
                    debug!(%peer, "out of scope, not scheduled");
                    out_of_scope.insert(peer);
                    continue;
                }
                if depth + 1 >= max_depth {
                    debug!(%peer, depth = depth + 1, "beyond depth bound, not scheduled");
                    beyond_depth.insert(peer);
                    continue;
                }
                debug!(%peer, depth = depth + 1, "scheduling container");
                visited.insert(peer.clone());
                queue.push_back((peer, depth + 1));
            }

            info!(
                %path,
                depth,
                items = container.item_count(),
                queued = queue.len(),
                "container exported"
            );
            observer.container_finished(&container);
            sink.accept(container);
            report.containers_exported += 1;
        }

        report.beyond_depth = beyond_depth.into_iter().collect();
        report.out_of_scope = out_of_scope.into_iter().collect();
        report.duration = start_time.elapsed();

        info!(
            exported = report.containers_exported,
            skipped = report.skipped.len(),
            link_warnings = report.link_warnings.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration.as_millis(),
            "traversal completed"
        );

        report
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Open, walk and release one container.
    fn export_one(&mut self, path: &str, depth: u32) -> Result<(Container, Vec<ModExportError>)> {
        let open = OpenContainer::open(&mut *self.accessor, path)?;
        let name = open.name();
        let records = open.items()?;
        let walk = self.walker.build(path, &records);

        Ok((
            Container {
                path: path.to_string(),
                name,
                depth,
                items: walk.items,
            },
            walk.warnings,
        ))
    }
}

/// Distinct peer container paths referenced anywhere in `items`, in
/// discovery order (pre-order over items, link order within an item).
pub fn peer_containers(items: &[Item]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut peers = Vec::new();
    for item in items {
        item.visit(&mut |i| {
            for link in &i.links {
                if seen.insert(link.peer_container.as_str()) {
                    peers.push(link.peer_container.clone());
                }
            }
        });
    }
    peers
}

// ---------------------------------------------------------------------------
// Scoped container handle
// ---------------------------------------------------------------------------

/// An open container, closed when dropped on every exit path.
struct OpenContainer<'s, A: ContainerAccessor> {
    accessor: &'s mut A,
    handle: Option<A::Handle>,
    path: String,
}

impl<'s, A: ContainerAccessor> OpenContainer<'s, A> {
    fn open(accessor: &'s mut A, path: &str) -> Result<Self> {
        let handle = accessor.open(path)?;
        debug!(%path, "container opened");
        Ok(Self {
            accessor,
            handle: Some(handle),
            path: path.to_string(),
        })
    }

    fn handle(&self) -> &A::Handle {
        self.handle.as_ref().expect("handle held until drop")
    }

    fn name(&self) -> String {
        self.accessor.name(self.handle())
    }

    fn items(&self) -> Result<Vec<FlatRecord>> {
        self.accessor.items(self.handle())
    }
}

impl<A: ContainerAccessor> Drop for OpenContainer<'_, A> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.accessor.close(handle);
            debug!(path = %self.path, "container released");
        }
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which peer containers may be scheduled.
struct TraversalScope {
    /// Include patterns (if non-empty, path must match at least one).
    include_patterns: Vec<regex::Regex>,
    /// Exclude patterns (if path matches any, it's excluded).
    exclude_patterns: Vec<regex::Regex>,
}

impl TraversalScope {
    fn new(config: &TraversalConfig) -> Self {
        Self {
            include_patterns: compile(&config.include_patterns),
            exclude_patterns: compile(&config.exclude_patterns),
        }
    }

    fn in_scope(&self, path: &str) -> bool {
        if self.exclude_patterns.iter().any(|p| p.is_match(path)) {
            return false;
        }
        self.include_patterns.is_empty() || self.include_patterns.iter().any(|p| p.is_match(path))
    }
}

fn compile(patterns: &[String]) -> Vec<regex::Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            let re = glob_to_regex(p);
            if re.is_none() {
                warn!(pattern = %p, "ignoring invalid container pattern");
            }
            re
        })
        .collect()
}

/// Convert a glob-like pattern to a regex.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    regex::Regex::new(&format!("^{escaped}$")).ok()
}

#[cfg(test)]
mod traverser_tests {
    use super::*;
    use std::collections::HashMap;

    use modexport_shared::{LinkDirection, OpenFailure, RawEndpoint, RawRelationship};

    /// In-memory accessor counting open/close calls.
    #[derive(Default)]
    struct MemoryAccessor {
        containers: HashMap<String, Vec<FlatRecord>>,
        locked: HashSet<String>,
        unreadable: HashSet<String>,
        opens: usize,
        closes: usize,
        open_log: Vec<String>,
    }

    impl MemoryAccessor {
        fn with(mut self, path: &str, records: Vec<FlatRecord>) -> Self {
            self.containers.insert(path.into(), records);
            self
        }
    }

    impl ContainerAccessor for MemoryAccessor {
        type Handle = String;

        fn open(&mut self, path: &str) -> Result<String> {
            self.open_log.push(path.to_string());
            if self.locked.contains(path) {
                return Err(ModExportError::container_open(path, OpenFailure::Locked));
            }
            if !self.containers.contains_key(path) {
                return Err(ModExportError::container_open(path, OpenFailure::NotFound));
            }
            self.opens += 1;
            Ok(path.to_string())
        }

        fn name(&self, handle: &String) -> String {
            modexport_shared::default_container_name(handle)
        }

        fn items(&self, handle: &String) -> Result<Vec<FlatRecord>> {
            if self.unreadable.contains(handle) {
                return Err(ModExportError::ContainerRead {
                    path: handle.clone(),
                    message: "corrupt".into(),
                });
            }
            Ok(self.containers.get(handle).cloned().unwrap_or_default())
        }

        fn close(&mut self, _handle: String) {
            self.closes += 1;
        }
    }

    fn item(id: &str, level: u32, targets: &[(&str, &str)]) -> FlatRecord {
        let relationships = if targets.is_empty() {
            vec![]
        } else {
            vec![RawRelationship {
                link_type: "satisfies".into(),
                direction: LinkDirection::Outgoing,
                endpoints: targets
                    .iter()
                    .map(|(c, i)| RawEndpoint {
                        container: Some(c.to_string()),
                        item_id: Some(i.to_string()),
                    })
                    .collect(),
            }]
        };
        FlatRecord {
            identifier: id.into(),
            level,
            attributes: vec![],
            relationships,
        }
    }

    fn run(accessor: &mut MemoryAccessor, root: &str, max_depth: u32) -> (Vec<Container>, TraversalReport) {
        run_with(accessor, root, max_depth, &TraversalConfig::default())
    }

    fn run_with(
        accessor: &mut MemoryAccessor,
        root: &str,
        max_depth: u32,
        config: &TraversalConfig,
    ) -> (Vec<Container>, TraversalReport) {
        let mut sink: Vec<Container> = Vec::new();
        let report =
            ContainerTraverser::new(accessor, config).run(root, max_depth, &mut sink, &NoopObserver);
        (sink, report)
    }

    fn paths(containers: &[Container]) -> Vec<(&str, u32)> {
        containers.iter().map(|c| (c.path.as_str(), c.depth)).collect()
    }

    fn scenario() -> MemoryAccessor {
        MemoryAccessor::default()
            .with("/root", vec![item("A", 1, &[("/X", "X-1")]), item("B", 1, &[])])
            .with("/X", vec![item("X-1", 1, &[])])
    }

    #[test]
    fn depth_two_exports_direct_peers() {
        let mut accessor = scenario();
        let (containers, report) = run(&mut accessor, "/root", 2);

        assert_eq!(paths(&containers), vec![("/root", 0), ("/X", 1)]);
        let a = &containers[0].items[0];
        assert_eq!(a.links.len(), 1);
        assert_eq!(a.links[0].direction, LinkDirection::Outgoing);
        assert_eq!(a.links[0].peer_container, "/X");
        assert!(report.beyond_depth.is_empty());
    }

    #[test]
    fn depth_one_keeps_links_but_not_peers() {
        let mut accessor = scenario();
        let (containers, report) = run(&mut accessor, "/root", 1);

        assert_eq!(paths(&containers), vec![("/root", 0)]);
        assert_eq!(containers[0].items[0].links[0].peer_container, "/X");
        assert_eq!(report.beyond_depth, vec!["/X".to_string()]);
        assert_eq!(accessor.open_log, vec!["/root"]);
    }

    #[test]
    fn depth_zero_still_exports_root() {
        let mut accessor = scenario();
        let (containers, _) = run(&mut accessor, "/root", 0);
        assert_eq!(paths(&containers), vec![("/root", 0)]);
    }

    #[test]
    fn cycles_terminate() {
        let mut accessor = MemoryAccessor::default()
            .with("/A", vec![item("a", 1, &[("/B", "b")])])
            .with("/B", vec![item("b", 1, &[("/A", "a")])]);
        let (containers, _) = run(&mut accessor, "/A", 50);
        assert_eq!(paths(&containers), vec![("/A", 0), ("/B", 1)]);
    }

    #[test]
    fn shared_peer_is_exported_once_at_first_depth() {
        let mut accessor = MemoryAccessor::default()
            .with(
                "/A",
                vec![
                    item("a1", 1, &[("/B", "b"), ("/D", "d")]),
                    item("a2", 2, &[("/C", "c"), ("/B", "b")]),
                ],
            )
            .with("/B", vec![item("b", 1, &[("/D", "d")])])
            .with("/C", vec![item("c", 1, &[("/D", "d"), ("/E", "e")])])
            .with("/D", vec![item("d", 1, &[("/A", "a1")])])
            .with("/E", vec![item("e", 1, &[])]);

        let (containers, _) = run(&mut accessor, "/A", 10);
        assert_eq!(
            paths(&containers),
            vec![("/A", 0), ("/B", 1), ("/D", 1), ("/C", 1), ("/E", 2)]
        );
        assert_eq!(accessor.open_log.len(), 5);
    }

    #[test]
    fn deepest_level_contributes_no_containers() {
        let mut accessor = MemoryAccessor::default()
            .with("/A", vec![item("a", 1, &[("/B", "b")])])
            .with("/B", vec![item("b", 1, &[("/C", "c")])])
            .with("/C", vec![item("c", 1, &[("/D", "d")])])
            .with("/D", vec![item("d", 1, &[])]);

        let (containers, report) = run(&mut accessor, "/A", 3);
        assert_eq!(paths(&containers), vec![("/A", 0), ("/B", 1), ("/C", 2)]);
        assert!(containers.iter().all(|c| c.depth <= 3));
        assert_eq!(report.beyond_depth, vec!["/D".to_string()]);
    }

    #[test]
    fn open_failures_are_skipped_and_handles_released() {
        let mut accessor = MemoryAccessor::default()
            .with(
                "/A",
                vec![item("a", 1, &[("/Missing", "m"), ("/Locked", "l"), ("/Bad", "x"), ("/B", "b")])],
            )
            .with("/Locked", vec![])
            .with("/Bad", vec![])
            .with("/B", vec![item("b", 1, &[])]);
        accessor.locked.insert("/Locked".into());
        accessor.unreadable.insert("/Bad".into());

        let (containers, report) = run(&mut accessor, "/A", 2);
        assert_eq!(paths(&containers), vec![("/A", 0), ("/B", 1)]);
        assert_eq!(report.skipped.len(), 3);
        assert!(matches!(
            &report.skipped[1],
            ModExportError::ContainerOpen { reason: OpenFailure::Locked, .. }
        ));
        assert!(matches!(&report.skipped[2], ModExportError::ContainerRead { .. }));
        assert_eq!(accessor.opens, accessor.closes);
        assert_eq!(accessor.opens, 3);
    }

    #[test]
    fn failed_root_yields_empty_export() {
        let mut accessor = MemoryAccessor::default();
        let (containers, report) = run(&mut accessor, "/nowhere", 3);
        assert!(containers.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.containers_exported, 0);
    }

    #[test]
    fn excluded_peers_are_referenced_only() {
        let mut accessor = MemoryAccessor::default()
            .with(
                "/P/SRS",
                vec![item("s", 1, &[("/P/Archive/Old", "o"), ("/P/URS", "u")])],
            )
            .with("/P/Archive/Old", vec![item("o", 1, &[])])
            .with("/P/URS", vec![item("u", 1, &[])]);
        let config = TraversalConfig {
            exclude_patterns: vec!["/P/Archive/**".into()],
            ..TraversalConfig::default()
        };

        let (containers, report) = run_with(&mut accessor, "/P/SRS", 3, &config);
        assert_eq!(paths(&containers), vec![("/P/SRS", 0), ("/P/URS", 1)]);
        assert_eq!(containers[0].items[0].links.len(), 2);
        assert_eq!(report.out_of_scope, vec!["/P/Archive/Old".to_string()]);
    }

    #[test]
    fn cancellation_keeps_finished_containers() {
        struct CancelAfterFirst(Arc<AtomicBool>);
        impl TraversalObserver for CancelAfterFirst {
            fn container_finished(&self, _container: &Container) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let mut accessor = MemoryAccessor::default()
            .with("/A", vec![item("a", 1, &[("/B", "b"), ("/C", "c")])])
            .with("/B", vec![])
            .with("/C", vec![]);
        let flag = Arc::new(AtomicBool::new(false));
        let observer = CancelAfterFirst(flag.clone());
        let config = TraversalConfig::default();

        let mut sink: Vec<Container> = Vec::new();
        let report = ContainerTraverser::new(&mut accessor, &config)
            .with_cancel_flag(flag)
            .run("/A", 5, &mut sink, &observer);

        assert_eq!(paths(&sink), vec![("/A", 0)]);
        assert!(report.cancelled);
        assert_eq!(report.abandoned, 2);
        assert_eq!(accessor.opens, accessor.closes);
    }

    #[test]
    fn dangling_links_are_reported() {
        let mut records = vec![item("a", 1, &[])];
        records[0].relationships.push(RawRelationship {
            link_type: "refines".into(),
            direction: LinkDirection::Incoming,
            endpoints: vec![RawEndpoint::default()],
        });
        let mut accessor = MemoryAccessor::default().with("/A", records);
        let (containers, report) = run(&mut accessor, "/A", 2);
        assert!(containers[0].items[0].links.is_empty());
        assert_eq!(report.link_warnings.len(), 1);
    }

    #[test]
    fn peers_are_listed_in_discovery_order() {
        let records = vec![
            item("1", 1, &[("/Z", "z")]),
            item("1.1", 2, &[("/Y", "y"), ("/Z", "z2")]),
            item("2", 1, &[("/X", "x")]),
        ];
        let walk = HierarchyWalker::default().build("/A", &records);
        assert_eq!(peer_containers(&walk.items), vec!["/Z", "/Y", "/X"]);
    }

    #[test]
    fn test_glob_patterns() {
        let re = glob_to_regex("/P/*/SRS").unwrap();
        assert!(re.is_match("/P/Reqs/SRS"));
        assert!(!re.is_match("/P/Reqs/Sub/SRS"));

        let re = glob_to_regex("/P/**").unwrap();
        assert!(re.is_match("/P/Reqs/Sub/SRS"));

        let re = glob_to_regex("/P/SRS-?").unwrap();
        assert!(re.is_match("/P/SRS-2"));
        assert!(!re.is_match("/P/SRS-12"));
    }

    #[test]
    fn test_scope_includes() {
        let config = TraversalConfig {
            include_patterns: vec!["/P/**".into()],
            exclude_patterns: vec!["/P/Tmp/*".into()],
            ..TraversalConfig::default()
        };
        let scope = TraversalScope::new(&config);
        assert!(scope.in_scope("/P/SRS"));
        assert!(!scope.in_scope("/Q/SRS"));
        assert!(!scope.in_scope("/P/Tmp/Scratch"));
    }
}
