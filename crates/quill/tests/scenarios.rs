//! End-to-end behaviour of state batching and the render lifecycle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use quill::core::scheduler::{self, SchedulerConfig, SchedulerError};
use quill::core::{
    AttributeDescriptor, ChangeMap, ClassBuilder, Component, ComponentClass, ComponentError,
    ComponentOptions, ComponentType, Config, LifecycleState, RenderError, Renderer, StateError, Tag, Value,
    validators,
};
use quill::dom::Node;

// ============================================================================
// State batching
// ============================================================================

struct Pair;

impl ComponentType for Pair {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("foo1", AttributeDescriptor::new())
            .state("foo2", AttributeDescriptor::new())
    }
}

#[test]
fn same_turn_writes_form_one_batch() {
    let pair = Component::new::<Pair>(Config::new().with("foo1", 1).with("foo2", 2)).unwrap();
    let batches: Rc<RefCell<Vec<ChangeMap>>> = Rc::default();
    let batches_clone = Rc::clone(&batches);
    pair.on("stateChanged", move |event| {
        if let Some(changes) = event.changes() {
            batches_clone.borrow_mut().push(changes.clone());
        }
    });

    pair.set("foo1", 10).unwrap();
    pair.set("foo2", 20).unwrap();
    pair.set("foo1", 100).unwrap();
    assert!(batches.borrow().is_empty());
    scheduler::drain().unwrap();

    let batches = batches.borrow();
    assert_eq!(batches.len(), 1);
    let foo1 = batches[0].get("foo1").unwrap();
    assert_eq!((foo1.prev_val.clone(), foo1.new_val.clone()), (Value::Int(1), Value::Int(100)));
    let foo2 = batches[0].get("foo2").unwrap();
    assert_eq!((foo2.prev_val.clone(), foo2.new_val.clone()), (Value::Int(2), Value::Int(20)));
    assert_eq!(batches[0].keys().collect::<Vec<_>>(), vec!["foo1", "foo2"]);
}

struct Positive;

impl ComponentType for Positive {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.state(
            "foo",
            AttributeDescriptor::new()
                .validator(validators::Validator::predicate(|v| v.as_i64().is_some_and(|n| n > 0))),
        )
    }
}

#[test]
fn rejected_write_keeps_value_and_fires_nothing() {
    let component = Component::new::<Positive>(Config::new().with("foo", 1)).unwrap();
    let fired = Rc::new(Cell::new(0));
    for name in ["fooChanged", "stateChanged"] {
        let fired = Rc::clone(&fired);
        component.on(name, move |_| fired.set(fired.get() + 1));
    }

    let err = component.set("foo", -2).unwrap_err();
    assert!(matches!(err, ComponentError::State(StateError::Validation(ref e)) if e.key == "foo"));
    scheduler::drain().unwrap();

    assert_eq!(component.get("foo"), Some(Value::Int(1)));
    assert_eq!(fired.get(), 0);
}

struct Once;

impl ComponentType for Once {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.state("foo", AttributeDescriptor::new().write_once(true))
    }
}

#[test]
fn write_once_ignores_later_writes() {
    let component = Component::new::<Once>(Config::new()).unwrap();
    component.set("foo", 1).unwrap();
    component.set("foo", 2).unwrap();
    scheduler::drain().unwrap();
    assert_eq!(component.get("foo"), Some(Value::Int(1)));
}

// ============================================================================
// Update passes
// ============================================================================

fn render_ab(component: &Component, ctx: &mut quill::RenderContext<'_>) -> Result<(), RenderError> {
    let a = component.get("a").unwrap_or_default();
    let b = component.get("b").unwrap_or_default();
    ctx.open("p", None, vec![])?;
    ctx.text(&format!("{a}/{b}"))?;
    ctx.close("p")
}

struct Deferred;
struct Immediate;

impl ComponentType for Deferred {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("a", AttributeDescriptor::new().value(0))
            .state("b", AttributeDescriptor::new().value(0))
            .render(render_ab)
    }
}

impl ComponentType for Immediate {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.extends::<Deferred>().sync_updates(true)
    }
}

fn count_updates(component: &Component) -> Rc<Cell<usize>> {
    let updates = Rc::new(Cell::new(0));
    let updates_clone = Rc::clone(&updates);
    component.on("rendered", move |event| {
        if event.first_render() == Some(false) {
            updates_clone.set(updates_clone.get() + 1);
        }
    });
    updates
}

#[test]
fn deferred_class_updates_once_per_turn() {
    let component = Component::new::<Deferred>(Config::new()).unwrap();
    let updates = count_updates(&component);

    component.set("a", 1).unwrap();
    component.set("b", 2).unwrap();
    assert_eq!(updates.get(), 0);
    scheduler::drain().unwrap();

    assert_eq!(updates.get(), 1);
    assert_eq!(component.element().unwrap().to_html(), "<p>1/2</p>");
}

#[test]
fn sync_class_updates_per_write() {
    let component = Component::new::<Immediate>(Config::new()).unwrap();
    let updates = count_updates(&component);

    component.set("a", 1).unwrap();
    assert_eq!(component.element().unwrap().text_content(), "1/0");
    component.set("b", 2).unwrap();

    assert_eq!(updates.get(), 2);
    assert_eq!(component.element().unwrap().text_content(), "1/2");
}

#[test]
fn updates_patch_the_same_root() {
    let component = Component::new::<Deferred>(Config::new()).unwrap();
    let root = component.element().unwrap();
    let text = root.child(0).unwrap();

    component.set("a", 7).unwrap();
    scheduler::drain().unwrap();

    let updated = component.element().unwrap();
    assert!(updated.ptr_eq(&root));
    assert!(updated.child(0).unwrap().ptr_eq(&text));
    assert_eq!(text.text_content(), "7/0");
}

#[test]
fn state_synced_carries_the_batch() {
    let component = Component::new::<Deferred>(Config::new()).unwrap();
    let synced: Rc<RefCell<Vec<String>>> = Rc::default();
    let synced_clone = Rc::clone(&synced);
    component.on("stateSynced", move |event| {
        let keys = event.changes().map(|c| c.keys().map(str::to_string).collect::<Vec<_>>());
        synced_clone.borrow_mut().extend(keys.unwrap_or_default());
    });

    component.set("b", 1).unwrap();
    component.set("a", 1).unwrap();
    scheduler::drain().unwrap();
    assert_eq!(*synced.borrow(), vec!["b", "a"]);
}

// ============================================================================
// Children and refs
// ============================================================================

struct Leaf;

impl ComponentType for Leaf {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.render(|_, ctx| {
            ctx.open("span", None, vec![])?;
            ctx.text("leaf")?;
            ctx.close("span")
        })
    }
}

struct Toggle;

impl ComponentType for Toggle {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("show", AttributeDescriptor::new().value(true))
            .render(|component, ctx| {
                ctx.open("div", None, vec![])?;
                if component.get("show").and_then(|v| v.as_bool()).unwrap_or(false) {
                    ctx.void(Tag::component::<Leaf>(), None, vec![])?;
                }
                ctx.close("div")
            })
    }
}

#[test]
fn omitted_child_is_disposed() {
    let parent = Component::new::<Toggle>(Config::new()).unwrap();
    assert_eq!(parent.element().unwrap().to_html(), "<div><span>leaf</span></div>");
    let children = parent.child_components();
    assert_eq!(children.len(), 1);
    let child = children[0].clone();
    let disposed = Rc::new(Cell::new(false));
    let disposed_clone = Rc::clone(&disposed);
    child.on("disposed", move |_| disposed_clone.set(true));

    parent.set("show", false).unwrap();
    scheduler::drain().unwrap();

    assert!(disposed.get());
    assert_eq!(child.lifecycle(), LifecycleState::Disposed);
    assert!(child.element().unwrap().parent().is_none());
    assert!(parent.child_components().is_empty());
    assert_eq!(parent.element().unwrap().to_html(), "<div></div>");
}

#[test]
fn kept_child_survives_parent_update() {
    let parent = Component::new::<Toggle>(Config::new()).unwrap();
    let child = parent.child_components()[0].clone();

    parent.set("show", true).unwrap();
    scheduler::drain().unwrap();

    assert!(parent.child_components()[0].ptr_eq(&child));
    assert!(!child.is_disposed());
}

struct Field;

impl ComponentType for Field {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.render(|_, ctx| {
            ctx.open("label", None, vec![])?;
            ctx.void("input", None, vec![("ref".to_string(), Value::from("inner"))])?;
            ctx.close("label")
        })
    }
}

#[test]
fn void_element_ref_is_retrievable() {
    let field = Component::new::<Field>(Config::new()).unwrap();
    let inner = field.ref_node("inner").unwrap();
    assert_eq!(inner.tag(), Some("input"));
    assert!(inner.parent().unwrap().ptr_eq(&field.element().unwrap()));
    assert!(inner.attribute("ref").is_none());
}

// ============================================================================
// Renderers
// ============================================================================

struct Blank;

impl ComponentType for Blank {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("n", AttributeDescriptor::new().value(0))
            .render(|_, _| Ok(()))
    }
}

#[test]
fn empty_output_leaves_no_element() {
    let component = Component::new::<Blank>(Config::new()).unwrap();
    assert!(component.element().is_none());
    assert_eq!(component.lifecycle(), LifecycleState::Rendered);

    component.set("n", 1).unwrap();
    scheduler::drain().unwrap();
    assert!(component.element().is_none());
}

#[test]
fn adopted_root_is_patched_in_place() {
    let host = Node::element("main");
    let external = Node::element("p");
    host.append_child(&external);

    let component = Component::with_options::<Deferred>(
        Config::new().with("a", 3),
        ComponentOptions::new().with_element(external.clone()),
    )
    .unwrap();

    assert!(component.element().unwrap().ptr_eq(&external));
    assert_eq!(host.to_html(), "<main><p>3/0</p></main>");
}

/// Writes the state as `key=value` lines into a `pre`.
struct DumpRenderer;

impl Renderer for DumpRenderer {
    fn render(&self, component: &Component) -> Result<(), RenderError> {
        let node = component.element().unwrap_or_else(|| Node::element("pre"));
        let lines: Vec<String> = component
            .state()
            .keys()
            .into_iter()
            .filter(|key| key == "a" || key == "b")
            .map(|key| format!("{key}={}", component.get(&key).unwrap_or_default()))
            .collect();
        let body = lines.join("\n");
        match node.child(0) {
            Some(text) => text.set_text(&body),
            None => node.append_child(&Node::text(&body)),
        }
        component.set_element(Some(node));
        Ok(())
    }
}

#[test]
fn custom_renderer_replaces_the_class_one() {
    let component = Component::with_options::<Deferred>(
        Config::new().with("b", 4),
        ComponentOptions::new().with_renderer(DumpRenderer),
    )
    .unwrap();
    assert_eq!(component.element().unwrap().text_content(), "a=0\nb=4");

    component.set("a", 1).unwrap();
    scheduler::drain().unwrap();
    assert_eq!(component.element().unwrap().text_content(), "a=1\nb=4");
}

// ============================================================================
// Update failures and writes during a pass
// ============================================================================

/// Renders `<p data-n="n">n</p>`, failing halfway once `n` exceeds 3.
fn render_bounded(
    component: &Component,
    ctx: &mut quill::RenderContext<'_>,
) -> Result<(), RenderError> {
    let n = component.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
    ctx.open("p", None, vec![("data-n".into(), Value::from(n.to_string()))])?;
    ctx.text(&n.to_string())?;
    if n > 3 {
        return Err(RenderError::Failed(format!("n = {n} is out of range")));
    }
    ctx.close("p")
}

struct Bounded;
struct BoundedSync;

impl ComponentType for Bounded {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("n", AttributeDescriptor::new().value(0))
            .render(render_bounded)
    }
}

impl ComponentType for BoundedSync {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.extends::<Bounded>().sync_updates(true)
    }
}

fn mounted<T: ComponentType>() -> (Node, Component) {
    let host = Node::element("main");
    let component = Component::new::<T>(Config::new()).unwrap();
    host.append_child(&component.element().unwrap());
    (host, component)
}

#[test]
fn failed_deferred_update_surfaces_from_drain() {
    let (host, component) = mounted::<Bounded>();
    let root = component.element().unwrap();
    assert_eq!(host.to_html(), r#"<main><p data-n="0">0</p></main>"#);

    component.set("n", 5).unwrap();
    let err = scheduler::drain().unwrap_err();

    assert!(matches!(err, SchedulerError::TaskFailed(_)));
    assert_eq!(host.to_html(), r#"<main><p data-n="0">0</p></main>"#);
    assert!(component.element().unwrap().ptr_eq(&root));
    assert_eq!(component.lifecycle(), LifecycleState::Rendered);
}

#[test]
fn failed_sync_update_is_returned_to_the_writer() {
    let (host, component) = mounted::<BoundedSync>();

    let err = component.set("n", 5).unwrap_err();
    assert_eq!(
        err,
        ComponentError::Render(RenderError::Failed("n = 5 is out of range".into()))
    );
    assert_eq!(host.to_html(), r#"<main><p data-n="0">0</p></main>"#);

    component.set("n", 2).unwrap();
    assert_eq!(host.to_html(), r#"<main><p data-n="2">2</p></main>"#);
}

thread_local! {
    static MARKING_LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn log_marking(entry: String) {
    MARKING_LOG.with(|log| log.borrow_mut().push(entry));
}

/// Marks itself `seen` from inside its first render.
struct SelfMarking;

impl ComponentType for SelfMarking {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class
            .state("seen", AttributeDescriptor::new().value(false))
            .sync_updates(true)
            .on_created(|component| {
                component.on("stateChanged", |_| log_marking("stateChanged".into()));
            })
            .on_rendered(|_, first| log_marking(format!("rendered:{first}")))
            .render(|component, ctx| {
                let seen = component.get("seen").and_then(|v| v.as_bool()).unwrap_or(false);
                log_marking(format!("render:{seen}"));
                if !seen {
                    component.set("seen", true)?;
                }
                ctx.open("p", None, vec![])?;
                ctx.text(&seen.to_string())?;
                ctx.close("p")
            })
    }
}

#[test]
fn sync_write_during_first_render_lands_in_next_batch() {
    let component = Component::new::<SelfMarking>(Config::new()).unwrap();

    assert_eq!(component.get("seen"), Some(Value::Bool(true)));
    assert_eq!(component.element().unwrap().to_html(), "<p>true</p>");
    MARKING_LOG.with(|log| {
        assert_eq!(
            *log.borrow(),
            vec![
                "render:false",
                "stateChanged",
                "rendered:true",
                "render:true",
                "rendered:false",
            ]
        );
    });
    assert!(scheduler::is_idle());
}

// ============================================================================
// Classes
// ============================================================================

struct Base;
struct Derived;

impl ComponentType for Base {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.static_value("tags", vec!["base"])
    }
}

impl ComponentType for Derived {
    fn define(class: ClassBuilder) -> ClassBuilder {
        class.extends::<Base>().static_value("tags", vec!["derived"])
    }
}

#[test]
fn statics_fold_along_the_chain() {
    let class = ComponentClass::of::<Derived>().unwrap();
    let concat = |derived: Value, parents: Value| {
        let mut items = parents.as_list().map(<[Value]>::to_vec).unwrap_or_default();
        items.extend(derived.as_list().map(<[Value]>::to_vec).unwrap_or_default());
        Value::List(items)
    };

    assert_eq!(
        class.static_property("tags", Some(&concat)),
        Some(Value::from(vec!["base", "derived"]))
    );
    assert_eq!(class.static_property("tags", None), Some(Value::from(vec!["derived"])));
    assert_eq!(class.static_property("missing", None), None);
}

// ============================================================================
// Scheduler
// ============================================================================

#[test]
fn runaway_queue_stops_at_budget() {
    scheduler::configure(SchedulerConfig::default().with_max_tasks_per_drain(3));
    for _ in 0..5 {
        scheduler::defer(|| {});
    }

    let err = scheduler::drain().unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::TaskBudgetExceeded {
            budget: 3,
            remaining: 2
        }
    ));
    assert_eq!(scheduler::pending(), 2);
    assert_eq!(scheduler::drain().unwrap(), 2);
}
