use anyhow::Result;

use larder_core::models::{NewUser, User};
use larder_core::service::LarderService;

pub(crate) fn cmd_user_add(
    service: &LarderService,
    name: String,
    email: String,
    phone: Option<String>,
    json: bool,
) -> Result<()> {
    let signup = service.sign_up(&NewUser { name, email, phone })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user": signup.user,
                "verification_code": signup.verification_code,
            }))?
        );
    } else {
        let id = signup.user.id;
        let code = &signup.verification_code;
        println!("Created account {} (id: {id})", signup.user.email);
        println!("Verify it with: larder user verify {id} {code}");
    }
    Ok(())
}

pub(crate) fn cmd_user_verify(
    service: &LarderService,
    id: i64,
    code: &str,
    json: bool,
) -> Result<()> {
    let user = service.verify_user(id, code)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Verified {}", user.email);
    }
    Ok(())
}

pub(crate) fn cmd_user_show(service: &LarderService, id: i64, json: bool) -> Result<()> {
    let user = service.get_user(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        print_user(&user);
    }
    Ok(())
}

fn print_user(user: &User) {
    println!("=== {} ===", user.name);
    println!("  ID:       {}", user.id);
    println!("  Email:    {}", user.email);
    println!("  Phone:    {}", user.phone.as_deref().unwrap_or("-"));
    println!(
        "  Verified: {}",
        if user.verified { "yes" } else { "no" }
    );
    println!("  Since:    {}", user.created_at);
}
