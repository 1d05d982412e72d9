use std::env;

fn main() {
	println!("cargo:rerun-if-env-changed=LIBSQLITE3_FLAGS");

	let bundled = env::var_os("CARGO_FEATURE_BUNDLED_SQLITE").is_some();

	// The bundled amalgamation is compiled and linked by libsqlite3-sys.
	if !bundled {
		link_system();
	}
}

fn link_system() {
	let linked = pkg_config::Config::new()
		.atleast_version("3.34.1")
		.print_system_libs(false)
		.probe("sqlite3")
		.is_ok();

	if !linked {
		println!("cargo:rustc-link-lib=dylib=sqlite3");
	}
}
