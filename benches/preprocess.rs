use criterion::{criterion_group, criterion_main, Criterion};

use buildpp::config::BuilderConfig;
use buildpp::driver::Preprocessor;

fn bench_preprocess_short(c: &mut Criterion) {
    c.bench_function("preprocess", |b| {
        b.iter(|| {
            let input = String::from(
                "\
@set VERSIONAR [3, 5, 0, 0]
@macro patch_class(name)
class @{name} {
    units[] = {};
    weapons[] = {};
    requiredVersion = 1.56;
    requiredAddons[] = {\"ace_common\"};
    author[] = {\"Nou\"};
    version = \"3.5.0.0\";
    versionStr = \"3.5.0.0\";
    versionAr[] = @{VERSIONAR};
};
@endmacro

class CfgPatches {
@include patch_class(\"ace_frag\")
};
",
            );

            let mut preprocessor = Preprocessor::new(BuilderConfig::default());
            preprocessor.execute(None, &input).unwrap();
        })
    });
}

criterion_group!(benches, bench_preprocess_short);
criterion_main!(benches);
