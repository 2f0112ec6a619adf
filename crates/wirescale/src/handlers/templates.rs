//! html templates for user-facing pages.
//!
//! consolidated here to avoid inline html in handlers.

/// pairing page shown for a pending interactive registration.
pub fn pairing_page(token: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Register your machine</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }}
        code {{ background: #f4f4f4; padding: 2px 8px; border-radius: 4px; }}
        .command {{ background: #1a1a2e; color: #eee; padding: 15px; border-radius: 8px; margin: 20px 0; }}
        .command code {{ background: transparent; color: #4ade80; }}
    </style>
</head>
<body>
    <h1>Register your machine</h1>
    <p>Run the following command on the coordination server to add this machine to a namespace:</p>
    <div class="command">
        <code>wirescale nodes register --namespace NAMESPACE --token {token}</code>
    </div>
    <p>The client keeps polling and connects as soon as the command completes.</p>
</body>
</html>"#
    )
}

/// page shown after a successful oidc authentication.
pub fn oidc_result_page(user: &str, verb: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>wirescale</title></head>
<body>
<h1>wirescale</h1>
<p>{verb} as {user}, you can now close this window.</p>
</body>
</html>"#
    )
}
