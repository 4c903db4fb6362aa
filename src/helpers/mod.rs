/// `inspect_err` callback that logs the error together with the call site.
macro_rules! ert {
    () => {
        |e| ::tracing::error!(error = %e, "{}:{}", file!(), line!())
    };
}

pub(crate) use ert;
