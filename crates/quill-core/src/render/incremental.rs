//! The incremental renderer.

use std::rc::Rc;

use quill_dom::IncrementalDom;

use super::{RenderContext, RenderError, Renderer};
use crate::component::{Component, PassOutcome};

/// Runs the class render function and reconciles its output against the
/// component's current element.
///
/// The first pass creates the tree (or reuses an adopted element when tag
/// and key match); later passes patch it in place. A class without a render
/// function keeps whatever element it has.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementalRenderer;

thread_local! {
    static INCREMENTAL_RENDERER: Rc<IncrementalRenderer> = Rc::new(IncrementalRenderer);
}

impl IncrementalRenderer {
    pub fn shared() -> Rc<dyn Renderer> {
        INCREMENTAL_RENDERER.with(|renderer| Rc::clone(renderer) as Rc<dyn Renderer>)
    }
}

impl Renderer for IncrementalRenderer {
    fn render(&self, component: &Component) -> Result<(), RenderError> {
        let Some(render_fn) = component.class().render_fn() else {
            return Ok(());
        };
        let current = component.element();

        component.begin_pass();
        let result = IncrementalDom::patch_outer(current.as_ref(), |dom| {
            let mut ctx = RenderContext::new(dom, component);
            render_fn(component, &mut ctx)?;
            ctx.finish()
        });

        match result {
            Ok((root, ())) => {
                component.end_pass(PassOutcome::Commit);
                component.set_element(root);
                Ok(())
            }
            Err(err) => {
                component.end_pass(PassOutcome::Abort);
                Err(err)
            }
        }
    }
}
