use litestmt::{Connection, Value, named_params, params};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

	let db = Connection::open_in_memory()?;
	db.exec("create table inventory(sku text primary key, qty integer not null, photo blob)")?;

	let tx = db.transaction()?;
	let mut insert = tx.prepare("insert into inventory(sku, qty, photo) values (:sku, :qty, zeroblob(:size))")?;
	for (sku, qty) in [("A100", 8_i64), ("B205", 14), ("C330", 3)] {
		insert.run(named_params! { "sku" => sku, "qty" => qty, "size" => 32 * 1024 })?;
	}
	insert.finalize()?;
	tx.commit()?;

	let mut low_stock = db.prepare("select sku, qty from inventory where qty < ? order by sku")?;
	for row in low_stock.iter(params![10])? {
		let row = row?;
		match row.values() {
			[Value::Text(sku), Value::Integer(qty)] => println!("{sku}: {qty}"),
			_ => return Err("unexpected row shape".into()),
		}
	}

	let rowid = db.prepare("select rowid from inventory where sku = ?")?.value(params!["A100"])?;
	if let Some([Value::Integer(rowid)]) = rowid.as_deref() {
		let mut photo = db.open_blob("inventory", "photo", *rowid, false)?;
		photo.write_at(0, b"\x89PNG")?;
		println!("photo has {} chunks", photo.chunks().count());
		photo.close()?;
	}

	Ok(())
}
