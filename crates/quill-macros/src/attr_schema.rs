//! Attribute knowledge used to validate markup at compile time.

use crate::suggestions::levenshtein_distance;

/// A listener attribute and the event it binds.
#[derive(Debug, Clone, Copy)]
pub struct ListenerSchema {
    /// The attribute name written in markup.
    pub prop: &'static str,
    /// The event name dispatched on the node.
    pub event: &'static str,
}

impl ListenerSchema {
    const fn new(prop: &'static str, event: &'static str) -> Self {
        Self { prop, event }
    }
}

static LISTENERS: &[ListenerSchema] = &[
    ListenerSchema::new("onClick", "click"),
    ListenerSchema::new("onDblClick", "dblclick"),
    ListenerSchema::new("onContextMenu", "contextmenu"),
    ListenerSchema::new("onMouseDown", "mousedown"),
    ListenerSchema::new("onMouseUp", "mouseup"),
    ListenerSchema::new("onMouseMove", "mousemove"),
    ListenerSchema::new("onMouseEnter", "mouseenter"),
    ListenerSchema::new("onMouseLeave", "mouseleave"),
    ListenerSchema::new("onMouseOver", "mouseover"),
    ListenerSchema::new("onMouseOut", "mouseout"),
    ListenerSchema::new("onPointerDown", "pointerdown"),
    ListenerSchema::new("onPointerUp", "pointerup"),
    ListenerSchema::new("onPointerMove", "pointermove"),
    ListenerSchema::new("onTouchStart", "touchstart"),
    ListenerSchema::new("onTouchEnd", "touchend"),
    ListenerSchema::new("onTouchMove", "touchmove"),
    ListenerSchema::new("onWheel", "wheel"),
    ListenerSchema::new("onScroll", "scroll"),
    ListenerSchema::new("onKeyDown", "keydown"),
    ListenerSchema::new("onKeyUp", "keyup"),
    ListenerSchema::new("onKeyPress", "keypress"),
    ListenerSchema::new("onFocus", "focus"),
    ListenerSchema::new("onBlur", "blur"),
    ListenerSchema::new("onInput", "input"),
    ListenerSchema::new("onChange", "change"),
    ListenerSchema::new("onSubmit", "submit"),
    ListenerSchema::new("onReset", "reset"),
    ListenerSchema::new("onSelect", "select"),
    ListenerSchema::new("onDragStart", "dragstart"),
    ListenerSchema::new("onDragEnd", "dragend"),
    ListenerSchema::new("onDrop", "drop"),
    ListenerSchema::new("onLoad", "load"),
    ListenerSchema::new("onError", "error"),
];

/// Whether `prop` is written as a listener (`on` followed by an uppercase
/// letter).
pub fn is_listener_prop(prop: &str) -> bool {
    prop.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// The known listener for a camel-case prop, matched on its event name.
pub fn find_listener(prop: &str) -> Option<&'static ListenerSchema> {
    let event = prop.strip_prefix("on")?.to_ascii_lowercase();
    LISTENERS.iter().find(|l| l.event == event)
}

/// The listener a lowercase `on<event>` prop was probably meant to be.
pub fn lowercase_listener(prop: &str) -> Option<&'static ListenerSchema> {
    if is_listener_prop(prop) {
        return None;
    }
    let event = prop.strip_prefix("on")?;
    LISTENERS.iter().find(|l| l.event == event)
}

/// All known listener prop names.
pub fn listener_props() -> Vec<&'static str> {
    LISTENERS.iter().map(|l| l.prop).collect()
}

/// Attribute names the render context treats specially on elements.
static RESERVED: &[&str] = &["key", "ref", "class"];

/// Real attributes one edit away from a reserved name.
static NEAR_RESERVED: &[&str] = &["rel", "rev"];

/// The reserved attribute `prop` is probably a typo of.
pub fn misspelled_reserved(prop: &str) -> Option<&'static str> {
    if NEAR_RESERVED.contains(&prop) {
        return None;
    }
    RESERVED
        .iter()
        .copied()
        .find(|reserved| *reserved != prop && levenshtein_distance(prop, reserved) == 1)
}

/// Check if an HTML tag is a void element (cannot have children).
pub fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "param" | "source" | "track" | "wbr"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_props_are_camel_case() {
        assert!(is_listener_prop("onClick"));
        assert!(!is_listener_prop("onclick"));
        assert!(!is_listener_prop("one"));
        assert!(!is_listener_prop("on"));
    }

    #[test]
    fn listener_lookup_ignores_case_after_prefix() {
        assert_eq!(find_listener("onClick").map(|l| l.event), Some("click"));
        assert_eq!(find_listener("onKeydown").map(|l| l.event), Some("keydown"));
        assert!(find_listener("onClik").is_none());
    }

    #[test]
    fn lowercase_listener_suggestion() {
        assert_eq!(lowercase_listener("onclick").map(|l| l.prop), Some("onClick"));
        assert!(lowercase_listener("onClick").is_none());
        assert!(lowercase_listener("online").is_none());
    }

    #[test]
    fn reserved_typos() {
        assert_eq!(misspelled_reserved("kye"), None);
        assert_eq!(misspelled_reserved("ky"), Some("key"));
        assert_eq!(misspelled_reserved("clas"), Some("class"));
        assert_eq!(misspelled_reserved("reff"), Some("ref"));
        assert_eq!(misspelled_reserved("rel"), None);
        assert_eq!(misspelled_reserved("class"), None);
        assert_eq!(misspelled_reserved("id"), None);
    }
}
