//! Procedural macros for quill - markup syntax.
//!
//! Provides the `markup!` macro, which expands a declarative tree into the
//! open/close/void/text calls of a render context.

mod attr_schema;
mod suggestions;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::ext::IdentExt;
use syn::parse::{Parse, ParseStream};
use syn::{braced, token, Block, Expr, Ident, LitStr, Path, Result, Token};

use attr_schema::{
    find_listener, is_listener_prop, is_void_element, listener_props, lowercase_listener,
    misspelled_reserved,
};
use suggestions::{
    format_duplicate_prop_error, format_lowercase_listener_error, format_reserved_typo_error,
    format_unknown_listener_error, format_void_children_error,
};

/// Describe a render output in markup.
///
/// The first argument is the render context, followed by the nodes. The
/// expansion evaluates to `Result<(), RenderError>`.
///
/// - `div { ... }`: an element; lowercase names are elements
/// - `Counter { ... }`: a component tag for the `ComponentType` `Counter`
/// - `@badge { ... }`: a function tag calling `badge`
/// - `"text"` and `{expr}`: text, `expr` is formatted with `ToString`
/// - `..children`: replay forwarded `Children`
/// - `#{ ... }`: a Rust block run in place, which may call `markup!` itself
///
/// Attributes are `name: value,` pairs before or among the children. The
/// name may be a string literal (`"aria-label": ...`). `key` and `ref` are
/// reserved. `onClick`-style attributes take a closure or the name of a
/// class method. A tag with empty braces is emitted as a void call.
///
/// # Example
///
/// ```ignore
/// use quill::prelude::*;
///
/// fn render(component: &Component, ctx: &mut RenderContext<'_>) -> Result<(), RenderError> {
///     let count = component.get("count").unwrap_or_default();
///     markup!(ctx,
///         div { class: "counter",
///             span { {count} }
///             button { onClick: "increment", "+" }
///             Label { key: "caption", text: "clicks" }
///         }
///     )
/// }
/// ```
#[proc_macro]
pub fn markup(input: TokenStream) -> TokenStream {
    let markup = syn::parse_macro_input!(input as Markup);
    match markup.expand() {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// The whole macro input: a context and its nodes.
struct Markup {
    ctx: Ident,
    nodes: Vec<MarkupNode>,
}

impl Parse for Markup {
    fn parse(input: ParseStream) -> Result<Self> {
        let ctx: Ident = input.parse()?;
        input.parse::<Token![,]>()?;

        let mut nodes = Vec::new();
        while !input.is_empty() {
            nodes.push(input.parse()?);
            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(Markup { ctx, nodes })
    }
}

impl Markup {
    fn expand(&self) -> Result<TokenStream2> {
        let ctx = &self.ctx;
        let statements = self
            .nodes
            .iter()
            .map(|node| node.to_statements(ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(quote! {
            {
                #[allow(clippy::redundant_closure_call)]
                let __quill_result = (|| -> ::std::result::Result<(), ::quill::core::RenderError> {
                    #(#statements)*
                    ::std::result::Result::Ok(())
                })();
                __quill_result
            }
        })
    }
}

/// A node in the markup tree.
enum MarkupNode {
    /// An element, component or function tag.
    Element(MarkupElement),
    /// A text literal.
    Text(LitStr),
    /// A Rust expression in braces, rendered as text.
    Expr(Expr),
    /// Forwarded children, `..expr`.
    Children(Expr),
    /// A Rust block, `#{ ... }`.
    Block(Block),
}

impl Parse for MarkupNode {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(LitStr) {
            Ok(MarkupNode::Text(input.parse()?))
        } else if input.peek(token::Brace) {
            let content;
            braced!(content in input);
            Ok(MarkupNode::Expr(content.parse()?))
        } else if input.peek(Token![..]) {
            input.parse::<Token![..]>()?;
            Ok(MarkupNode::Children(input.parse()?))
        } else if input.peek(Token![#]) && input.peek2(token::Brace) {
            input.parse::<Token![#]>()?;
            Ok(MarkupNode::Block(input.parse()?))
        } else {
            Ok(MarkupNode::Element(input.parse()?))
        }
    }
}

impl MarkupNode {
    fn to_statements(&self, ctx: &Ident) -> Result<TokenStream2> {
        Ok(match self {
            MarkupNode::Element(el) => el.to_statements(ctx)?,
            MarkupNode::Text(lit) => quote! { #ctx.text(#lit)?; },
            MarkupNode::Expr(expr) => {
                quote! { #ctx.text(&::std::string::ToString::to_string(&#expr))?; }
            }
            MarkupNode::Children(expr) => quote! { #ctx.render_children(&#expr)?; },
            MarkupNode::Block(block) => quote! { #block },
        })
    }
}

/// What a tag names.
enum TagKind {
    Element(String),
    Component(Path),
    Function(Path),
}

/// A tag with its attributes and children.
struct MarkupElement {
    kind: TagKind,
    span: Span,
    props: Vec<MarkupProp>,
    children: Vec<MarkupNode>,
}

impl Parse for MarkupElement {
    fn parse(input: ParseStream) -> Result<Self> {
        let span = input.span();
        let kind = if input.peek(Token![@]) {
            input.parse::<Token![@]>()?;
            TagKind::Function(Path::parse_mod_style(input)?)
        } else {
            let path = Path::parse_mod_style(input)?;
            match path.get_ident() {
                Some(ident) if ident.to_string().starts_with(|c: char| c.is_ascii_lowercase()) => {
                    TagKind::Element(ident.to_string())
                }
                _ => TagKind::Component(path),
            }
        };

        let content;
        braced!(content in input);

        let mut props = Vec::new();
        let mut children = Vec::new();

        while !content.is_empty() {
            let is_prop = (content.peek(Ident::peek_any) || content.peek(LitStr))
                && content.peek2(Token![:])
                && !content.peek2(Token![::]);
            if is_prop {
                props.push(content.parse()?);
            } else {
                children.push(content.parse()?);
            }

            // Consume trailing comma if present
            if content.peek(Token![,]) {
                content.parse::<Token![,]>()?;
            }
        }

        Ok(MarkupElement {
            kind,
            span,
            props,
            children,
        })
    }
}

impl MarkupElement {
    fn display_name(&self) -> String {
        match &self.kind {
            TagKind::Element(name) => name.clone(),
            TagKind::Component(path) | TagKind::Function(path) => path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect::<Vec<_>>()
                .join("::"),
        }
    }

    /// Reject duplicate attributes, children on void elements and
    /// misspelled listener or reserved names.
    fn validate(&self) -> Result<()> {
        let tag = self.display_name();

        for (i, prop) in self.props.iter().enumerate() {
            if self.props[..i].iter().any(|p| p.name == prop.name) {
                return Err(syn::Error::new(
                    prop.span,
                    format_duplicate_prop_error(&tag, &prop.name),
                ));
            }
        }

        let TagKind::Element(name) = &self.kind else {
            return Ok(());
        };

        if is_void_element(name) && !self.children.is_empty() {
            return Err(syn::Error::new(self.span, format_void_children_error(name)));
        }

        for prop in &self.props {
            if is_listener_prop(&prop.name) && find_listener(&prop.name).is_none() {
                let msg = format_unknown_listener_error(name, &prop.name, &listener_props());
                return Err(syn::Error::new(prop.span, msg));
            }
            if let Some(listener) = lowercase_listener(&prop.name) {
                let msg = format_lowercase_listener_error(&prop.name, listener.prop);
                return Err(syn::Error::new(prop.span, msg));
            }
            if let Some(reserved) = misspelled_reserved(&prop.name) {
                let msg = format_reserved_typo_error(name, &prop.name, reserved);
                return Err(syn::Error::new(prop.span, msg));
            }
        }

        Ok(())
    }

    fn tag_tokens(&self) -> TokenStream2 {
        match &self.kind {
            TagKind::Element(name) => quote! { ::quill::core::Tag::element(#name) },
            TagKind::Component(path) => quote! { ::quill::core::Tag::component::<#path>() },
            TagKind::Function(path) => quote! { ::quill::core::Tag::function(#path) },
        }
    }

    fn to_statements(&self, ctx: &Ident) -> Result<TokenStream2> {
        self.validate()?;

        let tag = self.tag_tokens();

        let mut key = quote! { ::std::option::Option::None };
        let mut attrs = Vec::new();
        for prop in &self.props {
            let value = &prop.value;
            if prop.name == "key" {
                key = quote! {
                    ::std::option::Option::Some(::std::string::ToString::to_string(&#value))
                };
                continue;
            }
            let name = &prop.name;
            let value = prop.value_tokens();
            attrs.push(quote! { (::std::string::String::from(#name), #value) });
        }
        let attrs = quote! { ::std::vec![#(#attrs),*] };

        if self.children.is_empty() {
            return Ok(quote! { #ctx.void(#tag, #key, #attrs)?; });
        }

        let children = self
            .children
            .iter()
            .map(|child| child.to_statements(ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(quote! {
            #ctx.open(#tag, #key, #attrs)?;
            #(#children)*
            #ctx.close(#tag)?;
        })
    }
}

/// An attribute (`name: value`).
struct MarkupProp {
    name: String,
    span: Span,
    value: Expr,
}

impl Parse for MarkupProp {
    fn parse(input: ParseStream) -> Result<Self> {
        let (name, span) = if input.peek(LitStr) {
            let lit: LitStr = input.parse()?;
            (lit.value(), lit.span())
        } else {
            let ident = Ident::parse_any(input)?;
            (ident.unraw().to_string(), ident.span())
        };
        input.parse::<Token![:]>()?;
        let value: Expr = input.parse()?;
        Ok(MarkupProp { name, span, value })
    }
}

impl MarkupProp {
    fn is_listener(&self) -> bool {
        is_listener_prop(&self.name) || self.name.starts_with("data-on")
    }

    fn value_tokens(&self) -> TokenStream2 {
        let value = &self.value;
        match value {
            Expr::Closure(_) if self.is_listener() => {
                quote! { ::quill::core::Value::listener(#value) }
            }
            _ => quote! { ::quill::core::Value::from(#value) },
        }
    }
}
