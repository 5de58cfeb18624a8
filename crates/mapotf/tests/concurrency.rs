//! Transforms of independent blocks may run from several threads against one module
use mapotf::module;
use mapotf::transform::UpdateInPlace;
use pretty_assertions::assert_eq;

const BLOCKS: usize = 16;

fn resources() -> String {
    (0..BLOCKS)
        .map(|i| format!("resource \"fake_resource\" \"r{i}\" {{\n  name = \"r{i}\"\n}}\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn parallel_updates_of_different_blocks() {
    let source = resources();
    let module = module! { "main.tf" => source.as_str() };

    std::thread::scope(|scope| {
        for i in 0..BLOCKS {
            let module = &module;
            scope.spawn(move || {
                let patch = mapotf::edit::parse_body(&format!("index = {i}")).unwrap();
                let transform = UpdateInPlace {
                    target_block_address: format!("resource.fake_resource.r{i}"),
                    patch,
                };
                transform.apply(module).unwrap();
            });
        }
    });

    for i in 0..BLOCKS {
        let block = module.block(&format!("resource.fake_resource.r{i}")).unwrap();
        assert_eq!(block.attributes["index"].source(), i.to_string());
        assert_eq!(block.attributes["name"].source(), format!("\"r{i}\""));
    }
    assert_eq!(module.changed_files(), vec!["main.tf".to_string()]);
}

#[test]
fn parallel_additions_to_one_file() {
    let module = module! { "main.tf" => "" };

    std::thread::scope(|scope| {
        for i in 0..BLOCKS {
            let module = &module;
            scope.spawn(move || {
                let attribute = mapotf::edit::parse_attribute(&format!("l{i}"), &i.to_string()).unwrap();
                module.add_local(attribute, "locals.tf").unwrap();
            });
        }
    });

    for i in 0..BLOCKS {
        let local = module.block(&format!("local.l{i}")).unwrap();
        assert_eq!(local.file_name, "locals.tf");
        assert_eq!(local.local_value().unwrap().source(), i.to_string());
    }

    let rendered = module.render("locals.tf").unwrap();
    let body: hcl::Body = hcl::from_str(&rendered).unwrap();
    assert_eq!(body.blocks().count(), BLOCKS);
}
