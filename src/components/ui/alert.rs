use leptos::prelude::*;
use leptos_ui::clx;

mod components {
    use super::*;
    clx! {Alert, div, "relative w-full rounded-lg border px-4 py-3 text-sm flex items-start gap-3"}
    clx! {AlertTitle, h4, "mb-1 font-medium tracking-tight leading-none"}
    clx! {AlertDescription, p, "text-sm [&_p]:leading-relaxed"}

    // Floating container for transient notices.
    clx! {Toast, div, "fixed bottom-4 right-4 z-50 flex max-w-sm items-start gap-3 rounded-lg border bg-card px-4 py-3 text-sm shadow-lg"}
}

pub use components::*;
