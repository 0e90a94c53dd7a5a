use proc_macro::TokenStream;

use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Expr, Ident, ItemFn, ReturnType, Type};

/// Declares a fiber with its own static stack.
///
/// Turns `fn name() { .. }` into `fn name() -> Result<cofiber::FiberId, cofiber::Error>`,
/// which spawns the body on the calling core.
///
/// ```ignore
/// #[cofiber::fiber(stack = 2048)]
/// fn blinky() {
///     loop {
///         led.toggle();
///         cofiber::yield_now();
///     }
/// }
///
/// blinky().unwrap();
/// cofiber::run().unwrap();
/// ```
///
/// With `start = later` the function returns an unregistered `cofiber::Fiber` instead,
/// to be started on another core.
#[proc_macro_attribute]
pub fn fiber(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut stack: Option<Expr> = None;
    let mut start_later = false;

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("stack") {
            stack = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("start") {
            let when: Ident = meta.value()?.parse()?;
            match when.to_string().as_str() {
                "now" => start_later = false,
                "later" => start_later = true,
                _ => return Err(syn::Error::new(when.span(), "expected `now` or `later`")),
            }
            Ok(())
        } else {
            Err(meta.error("unsupported fiber property"))
        }
    });
    parse_macro_input!(attr with parser);

    let item = parse_macro_input!(item as ItemFn);

    let Some(stack) = stack else {
        return syn::Error::new(Span::call_site(), "missing stack size, e.g. `#[cofiber::fiber(stack = 2048)]`")
            .to_compile_error()
            .into();
    };

    if let Err(error) = check_entry(&item) {
        return error.to_compile_error().into();
    }

    let attributes = &item.attrs;
    let visibility = &item.vis;
    let name = &item.sig.ident;
    let body = &item.block;

    let result = if start_later {
        quote! {
            #(#attributes)*
            #visibility fn #name() -> ::core::result::Result<::cofiber::Fiber, ::cofiber::Error> {
                static STACK: ::cofiber::Stack<{ #stack }> = ::cofiber::Stack::new();
                ::cofiber::Fiber::new(&STACK, move || #body)
            }
        }
    } else {
        quote! {
            #(#attributes)*
            #visibility fn #name() -> ::core::result::Result<::cofiber::FiberId, ::cofiber::Error> {
                static STACK: ::cofiber::Stack<{ #stack }> = ::cofiber::Stack::new();
                ::cofiber::spawn(&STACK, move || #body)
            }
        }
    };

    result.into()
}

fn check_entry(item: &ItemFn) -> syn::Result<()> {
    let signature = &item.sig;

    if let Some(asyncness) = &signature.asyncness {
        return Err(syn::Error::new_spanned(asyncness, "fibers can't be async"));
    }
    if !signature.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&signature.generics, "fibers can't be generic"));
    }
    if !signature.inputs.is_empty() {
        return Err(syn::Error::new_spanned(&signature.inputs, "fibers don't take arguments"));
    }
    if let ReturnType::Type(_, output) = &signature.output {
        return Err(syn::Error::new_spanned(output, "fibers don't return anything"));
    }

    Ok(())
}

/// Runs the calling core's scheduler after the function body.
///
/// ```ignore
/// #[cofiber::main]
/// fn main() {
///     blinky().unwrap();
/// } // cofiber::run() here
/// ```
///
/// When the function returns a `Result`, a scheduler error is returned with `?`,
/// so its error type has to implement `From<cofiber::Error>`. Otherwise the scheduler error panics.
#[proc_macro_attribute]
pub fn main(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemFn);

    let attributes = &item.attrs;
    let visibility = &item.vis;
    let signature = &item.sig;
    let body = &item.block;

    let result = match returned_result(signature) {
        Some(output) => quote! {
            #(#attributes)*
            #visibility #signature {
                let output: #output = #body;
                ::cofiber::run()?;
                output
            }
        },
        None => quote! {
            #(#attributes)*
            #visibility #signature {
                let output = #body;
                ::cofiber::run().unwrap();
                output
            }
        },
    };

    result.into()
}

/// The return type, if it's spelled as some `Result`.
fn returned_result(signature: &syn::Signature) -> Option<&Type> {
    let ReturnType::Type(_, output) = &signature.output else {
        return None;
    };
    let Type::Path(path) = &**output else {
        return None;
    };

    let last = path.path.segments.last()?;
    (last.ident == "Result").then_some(&**output)
}
